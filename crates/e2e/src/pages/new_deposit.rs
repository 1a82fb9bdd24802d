use tracing::info;

use super::Screen;
use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, Role};
use crate::playwright::Driver;

/// "New deposit" form reached from a browse location
#[derive(Debug, Clone)]
pub struct NewDepositPage {
    parent: String,
}

impl NewDepositPage {
    pub fn new(parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into().trim_matches('/').to_string(),
        }
    }

    /// Create a deposit for a new archival group `slug` and return its id
    pub async fn create(&self, driver: &dyn Driver, slug: &str, name: &str) -> E2eResult<String> {
        let script = self
            .open()
            .fill(Locator::label("Archival group slug"), slug)
            .fill(Locator::label("Archival group name"), name)
            .click(Locator::role(Role::Button, "Create deposit").exact())
            .expect_visible(Locator::role(Role::Heading, "Deposit"))
            .read_text(Locator::test_id("deposit-id"), "deposit_id");
        let output = driver.run(&script).await?;

        let id = output.get("deposit_id")?.trim().to_string();
        if id.is_empty() {
            return Err(E2eError::AssertionFailed(format!(
                "new deposit under {} has no id",
                self.parent
            )));
        }
        info!("Created deposit {} through the UI", id);
        Ok(id)
    }
}

impl Screen for NewDepositPage {
    fn path(&self) -> String {
        format!("/deposits/new?parent={}", self.parent)
    }

    fn ready_signal(&self) -> Locator {
        Locator::role(Role::Heading, "New deposit")
    }
}
