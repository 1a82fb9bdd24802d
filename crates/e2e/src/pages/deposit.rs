use std::path::Path;
use tracing::debug;

use super::{alert, row, Screen};
use crate::error::E2eResult;
use crate::locator::{Locator, Role};
use crate::playwright::Driver;

/// A single deposit's working-files screen
#[derive(Debug, Clone)]
pub struct DepositPage {
    id: String,
}

impl DepositPage {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status_indicator(&self) -> Locator {
        Locator::test_id("deposit-status")
    }

    pub fn lock_indicator(&self) -> Locator {
        Locator::test_id("deposit-lock")
    }

    /// Row in the working-files table for `path`
    pub fn item_row(&self, path: &str) -> Locator {
        row(path).first()
    }

    /// Create `name` inside the deposit directory `parent`
    pub async fn create_folder(&self, driver: &dyn Driver, parent: &str, name: &str) -> E2eResult<()> {
        debug!("Creating folder {}/{} in deposit {}", parent, name, self.id);
        let script = self
            .open()
            .click(Locator::role(Role::Button, "New folder"))
            .fill(Locator::label("Parent folder"), parent)
            .fill(Locator::label("Folder name"), name)
            .click(Locator::role(Role::Button, "Create new folder").exact())
            .expect_visible(alert("Created folder"));
        driver.run(&script).await?;
        Ok(())
    }

    /// Upload a local file into the deposit directory `parent`
    pub async fn upload_file(&self, driver: &dyn Driver, parent: &str, file: &Path) -> E2eResult<()> {
        debug!("Uploading {} to {} in deposit {}", file.display(), parent, self.id);
        let script = self
            .open()
            .click(Locator::role(Role::Button, "Upload file"))
            .fill(Locator::label("Parent folder"), parent)
            .set_input_files(Locator::label("File"), vec![file.to_path_buf()])
            .click(Locator::role(Role::Button, "Upload").exact())
            .expect_visible(alert("Uploaded"));
        driver.run(&script).await?;
        Ok(())
    }

    /// Delete an item from the deposit, and from its METS when `from_mets`
    pub async fn delete_item(&self, driver: &dyn Driver, path: &str, from_mets: bool) -> E2eResult<()> {
        let mut script = self
            .open()
            .click(Locator::role(Role::Button, "Delete").within(self.item_row(path)));
        if from_mets {
            script = script.check(Locator::label("Also delete from METS"));
        }
        let script = script
            .click(Locator::role(Role::Button, "Delete item").exact())
            .expect_visible(alert("Deleted"))
            .expect_hidden(self.item_row(path));
        driver.run(&script).await?;
        Ok(())
    }

    pub async fn lock(&self, driver: &dyn Driver) -> E2eResult<()> {
        let script = self
            .open()
            .click(Locator::role(Role::Button, "Lock deposit"))
            .expect_visible(alert("Deposit locked"));
        driver.run(&script).await?;
        Ok(())
    }

    pub async fn unlock(&self, driver: &dyn Driver) -> E2eResult<()> {
        let script = self
            .open()
            .click(Locator::role(Role::Button, "Release lock"))
            .expect_visible(alert("Lock released"));
        driver.run(&script).await?;
        Ok(())
    }

    pub async fn regenerate_mets(&self, driver: &dyn Driver) -> E2eResult<()> {
        let script = self
            .open()
            .accept_dialog()
            .click(Locator::role(Role::Button, "Regenerate METS"))
            .expect_visible(alert("METS file regenerated"));
        driver.run(&script).await?;
        Ok(())
    }

    pub async fn status(&self, driver: &dyn Driver) -> E2eResult<String> {
        let script = self.open().read_text(self.status_indicator(), "status");
        let output = driver.run(&script).await?;
        Ok(output.get("status")?.to_string())
    }

    /// Names listed in the working-files table
    pub async fn listed_items(&self, driver: &dyn Driver) -> E2eResult<Vec<String>> {
        let script = self
            .open()
            .read_all_text(Locator::any(Role::Cell).within(Locator::test_id("deposit-files")), "items");
        driver.run(&script).await?.list("items")
    }
}

impl Screen for DepositPage {
    fn path(&self) -> String {
        format!("/deposits/{}", self.id)
    }

    fn ready_signal(&self) -> Locator {
        Locator::role(Role::Heading, format!("Deposit {}", self.id))
    }
}
