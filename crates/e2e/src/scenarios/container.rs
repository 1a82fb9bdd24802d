use async_trait::async_trait;
use tracing::info;

use preserve_common::ensure;

use super::unique_slug;
use crate::error::E2eResult;
use crate::pages::{BrowsePage, SearchPage};
use crate::scenario::{expect_eq, Scenario, ScenarioContext};
use crate::suite::Params;

/// Create, inspect and delete an empty container through the API
pub struct ContainerLifecycle;

#[async_trait]
impl Scenario for ContainerLifecycle {
    fn name(&self) -> &'static str {
        "container-lifecycle"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["api", "smoke"]
    }

    async fn run(&self, ctx: &ScenarioContext, _params: &Params) -> E2eResult<()> {
        ctx.ensure_test_root().await?;
        let slug = unique_slug("playwright-container-testing");
        let path = ctx.api.test_path(&slug);

        ctx.api.create_container(&path, &slug).await?;
        ctx.register_container(&path);

        let container = ctx.api.get_container(&path).await?;
        expect_eq("container type", "Container", container.kind.as_str())?;
        ensure!(
            container.containers.is_empty(),
            "new container has {} child containers",
            container.containers.len()
        );
        ensure!(
            container.binaries.is_empty(),
            "new container has {} binaries",
            container.binaries.len()
        );
        ensure!(container.created.is_some(), "container has no created timestamp");
        expect_eq("lastModified of new container", container.created, container.last_modified)?;

        ctx.api.delete_container(&path).await?;
        ctx.forget_container(&path);
        ensure!(
            ctx.api.try_get_container(&path).await?.is_none(),
            "container {} still exists after delete",
            path
        );
        info!("Container {} created and deleted", path);
        Ok(())
    }
}

/// Create, find and delete a container through the UI
pub struct ContainerUi;

#[async_trait]
impl Scenario for ContainerUi {
    fn name(&self) -> &'static str {
        "container-ui"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["ui", "smoke"]
    }

    async fn run(&self, ctx: &ScenarioContext, _params: &Params) -> E2eResult<()> {
        let root = ctx.ensure_test_root().await?;
        let slug = unique_slug("playwright-container-testing");
        let path = ctx.api.test_path(&slug);

        let browse = BrowsePage::new(&root);
        browse.create_container(ctx.driver(), &slug).await?;
        ctx.register_container(&path);

        let container = ctx.api.get_container(&path).await?;
        expect_eq("container type", "Container", container.kind.as_str())?;

        let rows = SearchPage::new().search(ctx.driver(), &slug).await?;
        ensure!(
            rows.iter().any(|r| r.contains(&slug)),
            "search for {} returned {:?}",
            slug,
            rows
        );

        let page = browse.open_child(ctx.driver(), &slug).await?;
        page.delete_container(ctx.driver()).await?;
        ensure!(
            ctx.api.try_get_container(&path).await?.is_none(),
            "container {} still exists after UI delete",
            path
        );
        ctx.forget_container(&path);
        Ok(())
    }
}
