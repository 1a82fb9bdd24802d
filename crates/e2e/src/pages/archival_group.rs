use super::Screen;
use crate::error::E2eResult;
use crate::locator::{Locator, Role};
use crate::playwright::Driver;

/// A preserved archival group
#[derive(Debug, Clone)]
pub struct ArchivalGroupPage {
    path: String,
}

impl ArchivalGroupPage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into().trim_matches('/').to_string(),
        }
    }

    pub fn version_indicator(&self) -> Locator {
        Locator::test_id("archival-group-version")
    }

    /// Displayed version, e.g. `v1`
    pub async fn version(&self, driver: &dyn Driver) -> E2eResult<String> {
        let script = self.open().read_text(self.version_indicator(), "version");
        Ok(driver.run(&script).await?.get("version")?.to_string())
    }

    /// Target of the IIIF manifest link
    pub async fn iiif_link(&self, driver: &dyn Driver) -> E2eResult<String> {
        let script = self
            .open()
            .read_attribute(Locator::role(Role::Link, "IIIF Manifest"), "href", "href");
        Ok(driver.run(&script).await?.get("href")?.to_string())
    }
}

impl Screen for ArchivalGroupPage {
    fn path(&self) -> String {
        format!("/browse/{}", self.path)
    }

    fn ready_signal(&self) -> Locator {
        Locator::text("Archival Group").first()
    }
}
