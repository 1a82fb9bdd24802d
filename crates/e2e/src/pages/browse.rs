use tracing::debug;

use super::{alert, row, Screen};
use crate::error::E2eResult;
use crate::locator::{Locator, Role};
use crate::playwright::Driver;

/// Repository browser positioned at a container
#[derive(Debug, Clone)]
pub struct BrowsePage {
    path: String,
}

impl BrowsePage {
    /// `path` is the repository path, without the `/browse` prefix
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into().trim_matches('/').to_string(),
        }
    }

    pub fn repository_path(&self) -> &str {
        &self.path
    }

    fn leaf(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Create a child container named `slug`
    pub async fn create_container(&self, driver: &dyn Driver, slug: &str) -> E2eResult<()> {
        debug!("Creating container {} under {}", slug, self.path);
        let script = self
            .open()
            .click(Locator::role(Role::Button, "New container"))
            .fill(Locator::label("Container name"), slug)
            .click(Locator::role(Role::Button, "Create container").exact())
            .expect_visible(Locator::role(Role::Heading, slug));
        driver.run(&script).await?;
        Ok(())
    }

    /// Delete this (empty) container
    pub async fn delete_container(&self, driver: &dyn Driver) -> E2eResult<()> {
        debug!("Deleting container {}", self.path);
        let script = self
            .open()
            .accept_dialog()
            .click(Locator::role(Role::Button, "Delete container"))
            .expect_visible(alert("Container deleted"));
        driver.run(&script).await?;
        Ok(())
    }

    /// Navigate into the child named `name` and return its browse page
    pub async fn open_child(&self, driver: &dyn Driver, name: &str) -> E2eResult<BrowsePage> {
        let child = BrowsePage::new(format!("{}/{}", self.path, name));
        let script = self
            .open()
            .click(Locator::role(Role::Link, name).within(row(name)).first())
            .expect_visible(child.ready_signal());
        driver.run(&script).await?;
        Ok(child)
    }
}

impl Screen for BrowsePage {
    fn path(&self) -> String {
        format!("/browse/{}", self.path)
    }

    fn ready_signal(&self) -> Locator {
        Locator::role(Role::Heading, self.leaf())
    }
}
