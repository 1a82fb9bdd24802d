use super::Screen;
use crate::error::E2eResult;
use crate::locator::{Locator, Role};
use crate::playwright::Driver;

/// Repository search
#[derive(Debug, Clone, Default)]
pub struct SearchPage;

impl SearchPage {
    pub fn new() -> Self {
        Self
    }

    pub fn results(&self) -> Locator {
        Locator::any(Role::Row).within(Locator::test_id("search-results"))
    }

    /// Search for `query` and return the text of each result row
    pub async fn search(&self, driver: &dyn Driver, query: &str) -> E2eResult<Vec<String>> {
        let script = self
            .open()
            .fill(Locator::any(Role::Searchbox), query)
            .click(Locator::role(Role::Button, "Search").exact())
            .expect_visible(Locator::role(Role::Heading, "Search results"))
            .read_all_text(self.results(), "rows");
        driver.run(&script).await?.list("rows")
    }
}

impl Screen for SearchPage {
    fn path(&self) -> String {
        "/search".to_string()
    }

    fn ready_signal(&self) -> Locator {
        Locator::any(Role::Searchbox)
    }
}
