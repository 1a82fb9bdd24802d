//! Page objects
//!
//! Each page object is a plain value naming where a screen lives and how to
//! find its elements. Composite actions build a [`Script`] that ends by
//! waiting for a terminal UI signal (an alert or heading), and hand it to a
//! [`Driver`]; a missing signal surfaces as
//! [`E2eError::LocatorTimeout`](crate::E2eError::LocatorTimeout).

mod archival_group;
mod browse;
mod deposit;
mod new_deposit;
mod search;

pub use archival_group::ArchivalGroupPage;
pub use browse::BrowsePage;
pub use deposit::DepositPage;
pub use new_deposit::NewDepositPage;
pub use search::SearchPage;

use async_trait::async_trait;
use preserve_common::poll::{Observation, StatusSource};

use crate::error::E2eError;
use crate::locator::{Locator, Role};
use crate::playwright::{Driver, Script};

/// A navigable screen
pub trait Screen: Send + Sync {
    /// Path relative to the UI base URL
    fn path(&self) -> String;

    /// Element whose visibility means the screen has loaded
    fn ready_signal(&self) -> Locator;

    /// Script navigating to the screen and waiting until it is ready
    fn open(&self) -> Script {
        Script::new().goto(self.path()).expect_visible(self.ready_signal())
    }
}

/// Alert banner containing `text`
pub(crate) fn alert(text: &str) -> Locator {
    Locator::any(Role::Alert).with_text(text)
}

/// Table row mentioning `text`
pub(crate) fn row(text: &str) -> Locator {
    Locator::any(Role::Row).with_text(text)
}

/// Polls a screen by re-opening it and reading a locator's text.
///
/// An element that never renders is reported as missing, so the poller keeps
/// trying until its own timeout.
pub struct PageTextSource<'a> {
    pub driver: &'a dyn Driver,
    pub screen: &'a dyn Screen,
    pub target: Locator,
}

#[async_trait]
impl<'a> StatusSource for PageTextSource<'a> {
    fn describe(&self) -> String {
        format!("{} on {}", self.target, self.screen.path())
    }

    async fn observe(&self) -> preserve_common::Result<Observation> {
        let script = self.screen.open().read_text(self.target.clone(), "text");
        match self.driver.run(&script).await {
            Ok(output) => match output.get("text") {
                Ok(text) => Ok(Observation::Status(text.to_string())),
                Err(e) => Err(preserve_common::Error::Source(e.to_string())),
            },
            Err(E2eError::LocatorTimeout { .. }) => Ok(Observation::Missing),
            Err(e) => Err(preserve_common::Error::Source(e.to_string())),
        }
    }
}
