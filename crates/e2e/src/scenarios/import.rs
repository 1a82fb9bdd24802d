use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use preserve_common::api::{
    ApiContext, DepositHandle, DepositStatusSource, IiifManifestSource, ImportJobResult,
    ImportJobStatusSource, NewDeposit,
};
use preserve_common::ensure;
use preserve_common::poll::{wait_for_status, PollPolicy, StatusMatcher};

use super::{create_deposit, stage_file, unique_slug};
use crate::error::E2eResult;
use crate::pages::ArchivalGroupPage;
use crate::scenario::{expect_eq, Scenario, ScenarioContext};
use crate::suite::Params;

/// Stage a file, preserve the deposit and check every published view of it
pub struct ImportPreserve;

#[async_trait]
impl Scenario for ImportPreserve {
    fn name(&self) -> &'static str {
        "import-preserve"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["api", "import", "iiif"]
    }

    fn long_running(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &ScenarioContext, params: &Params) -> E2eResult<()> {
        ctx.ensure_test_root().await?;
        let slug = unique_slug("playwright-import");
        let group_path = ctx.api.test_path(&slug);
        let relative = "objects/import-check.txt";

        let deposit = new_archival_group_deposit(ctx, &group_path, &slug).await?;
        let content = Bytes::from(format!("Preserved by {}\n", slug));
        stage_file(ctx, &deposit, relative, "text/plain", content.clone()).await?;

        let result = import_and_wait(&ctx.api, &deposit, &ctx.import_policy()?).await?;
        ctx.register_container(&group_path);
        info!("Preserved {} as version {:?}", group_path, result.new_version);

        let preserved_status = params.str_or("preserved_status", "preserved")?;
        let deposit_state = DepositStatusSource {
            api: &ctx.api,
            deposit_id: deposit.id.clone(),
        };
        wait_for_status(
            &deposit_state,
            &StatusMatcher::exact(preserved_status),
            &ctx.poll_policy()?,
        )
        .await?;

        let group = ctx.api.get_archival_group(&group_path).await?;
        expect_eq("archival group type", "ArchivalGroup", group.kind.as_str())?;
        ensure!(group.version.is_some(), "archival group {} has no version", group_path);

        let stored = ctx
            .api
            .storage_content(&format!("{}/{}", group_path, relative))
            .await?;
        expect_eq("stored content", &content, &stored.bytes)?;
        ensure!(
            stored
                .content_type
                .as_deref()
                .map(|ct| ct.starts_with("text/plain"))
                .unwrap_or(false),
            "stored content type is {:?}",
            stored.content_type
        );

        let manifest = IiifManifestSource {
            api: &ctx.api,
            path: group_path.clone(),
        };
        wait_for_status(&manifest, &StatusMatcher::exact("Manifest"), &ctx.poll_policy()?).await?;

        let page = ArchivalGroupPage::new(&group_path);
        let version = page.version(ctx.driver()).await?;
        ensure!(!version.is_empty(), "archival group page shows no version");
        let link = page.iiif_link(ctx.driver()).await?;
        ensure!(link.contains(&slug), "IIIF link {} does not point at {}", link, slug);
        Ok(())
    }
}

/// Deposit targeting a new archival group at `group_path`
pub(crate) async fn new_archival_group_deposit(
    ctx: &ScenarioContext,
    group_path: &str,
    name: &str,
) -> E2eResult<DepositHandle> {
    create_deposit(
        ctx,
        NewDeposit {
            archival_group: Some(ctx.api.url(&format!("repository/{}", group_path))),
            archival_group_name: Some(name.to_string()),
            submission_text: Some("import end-to-end check".to_string()),
        },
    )
    .await
}

/// Run the deposit's import diff and wait for it to finish without errors
pub(crate) async fn import_and_wait(
    api: &ApiContext,
    deposit: &DepositHandle,
    policy: &PollPolicy,
) -> E2eResult<ImportJobResult> {
    let diff = api.import_diff(&deposit.id).await?;
    ensure!(!diff.is_empty(), "import diff for deposit {} is empty", deposit.id);

    let started = api.run_import(&deposit.id, &diff).await?;
    let job = ImportJobStatusSource {
        api,
        result_uri: started.id.clone(),
    };
    let outcome = wait_for_status(&job, &StatusMatcher::pattern("completed.*")?, policy).await?;
    info!(
        "Import job for {} finished as {} after {} poll(s)",
        deposit.id, outcome.status, outcome.attempts
    );

    let result = api.get_import_result(&started.id).await?;
    expect_eq("import job status", "completed", result.status.as_str())?;
    ensure!(
        result.errors.is_empty(),
        "import job {} reported errors: {:?}",
        result.id,
        result.errors
    );
    Ok(result)
}
