use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use preserve_common::api::{ApiContext, DepositPatch, NewDeposit};
use preserve_common::ensure;
use preserve_common::mets::MetsVerifier;
use preserve_common::poll::{wait_for_status, StatusMatcher};

use super::{create_deposit, segments, stage_file, unique_slug};
use crate::error::E2eResult;
use crate::pages::{DepositPage, NewDepositPage, PageTextSource};
use crate::scenario::{expect_eq, Scenario, ScenarioContext};
use crate::suite::Params;

/// Upload with checksum, record in METS, then delete and check absence
pub struct DepositMets;

#[async_trait]
impl Scenario for DepositMets {
    fn name(&self) -> &'static str {
        "deposit-mets"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["api", "mets"]
    }

    async fn run(&self, ctx: &ScenarioContext, params: &Params) -> E2eResult<()> {
        let relative = params.str_or("path", "objects/hello.txt")?;
        let labels = segments(relative);
        let deposit = create_deposit(
            ctx,
            NewDeposit {
                submission_text: Some("deposit-mets end-to-end check".to_string()),
                ..Default::default()
            },
        )
        .await?;

        let note = unique_slug("deposit-mets");
        let patched = ctx
            .api
            .patch_deposit(
                &deposit.id,
                &DepositPatch {
                    submission_text: Some(note.clone()),
                    ..Default::default()
                },
            )
            .await?;
        expect_eq("submission text", Some(note.as_str()), patched.submission_text.as_deref())?;

        let content = format!("Hello from {}\n", note);
        let digest = stage_file(ctx, &deposit, relative, "text/plain", Bytes::from(content)).await?;

        let mets = ctx.api.get_mets(&deposit.id).await?;
        let verifier = MetsVerifier::new(&mets.manifest);
        let entry = verifier.assert_present(relative, &labels, Some("text/plain"))?;
        verifier.assert_digest(relative, "SHA256", &digest)?;
        info!("{} recorded as {} / {}", relative, entry.admin_id, entry.file_id);

        DepositPage::new(&deposit.id)
            .delete_item(ctx.driver(), relative, true)
            .await?;

        let mets = ctx.api.get_mets(&deposit.id).await?;
        MetsVerifier::new(&mets.manifest).assert_absent(relative, &labels)?;
        Ok(())
    }
}

/// Lock contention between two client identities
pub struct DepositLock;

#[async_trait]
impl Scenario for DepositLock {
    fn name(&self) -> &'static str {
        "deposit-lock"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["api", "locking"]
    }

    async fn run(&self, ctx: &ScenarioContext, _params: &Params) -> E2eResult<()> {
        let primary = &ctx.api;
        let secondary = ctx.secondary()?;
        let deposit = create_deposit(ctx, NewDeposit::default()).await?;
        let id = deposit.id.as_str();

        let outcome = contend_for_lock(primary, secondary, id).await;
        if outcome.is_err() {
            // Teardown deletes as the primary identity, which a lock held by
            // either identity can refuse
            for api in [secondary, primary] {
                if let Err(e) = api.unlock_deposit(id).await {
                    debug!("{} could not release deposit {}: {}", api.identity(), id, e);
                }
            }
        }
        outcome
    }
}

async fn contend_for_lock(primary: &ApiContext, secondary: &ApiContext, id: &str) -> E2eResult<()> {
    primary.lock_deposit(id, false).await?.expect_acquired(id)?;
    let locked = primary.get_deposit(id).await?;
    ensure!(locked.locked_by.is_some(), "deposit {} reports no lock holder", id);

    // Held by the primary identity: a plain request is refused, force wins
    secondary.lock_deposit(id, false).await?.expect_conflict(id)?;
    secondary.lock_deposit(id, true).await?.expect_acquired(id)?;
    primary.lock_deposit(id, false).await?.expect_conflict(id)?;

    secondary.unlock_deposit(id).await?;
    primary.lock_deposit(id, false).await?.expect_acquired(id)?;
    primary.unlock_deposit(id).await?;

    let released = primary.get_deposit(id).await?;
    ensure!(
        released.locked_by.is_none(),
        "deposit {} still locked by {:?}",
        id,
        released.locked_by
    );
    info!(
        "Lock contention on {} between {} and {} behaved as expected",
        id,
        primary.identity(),
        secondary.identity()
    );
    Ok(())
}

/// Deposit creation, folders, upload, locking and deletion through the UI
pub struct DepositUi;

#[async_trait]
impl Scenario for DepositUi {
    fn name(&self) -> &'static str {
        "deposit-ui"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["ui", "mets"]
    }

    async fn run(&self, ctx: &ScenarioContext, _params: &Params) -> E2eResult<()> {
        let root = ctx.ensure_test_root().await?;
        let slug = unique_slug("playwright-deposit-ui");
        let driver = ctx.driver();

        let id = NewDepositPage::new(&root)
            .create(driver, &slug, "Deposit UI end-to-end check")
            .await?;
        ctx.register_deposit(&id);
        let deposit = ctx.api.get_deposit(&id).await?.handle()?;

        let page = DepositPage::new(&id);
        let folder = "objects/ui-folder";
        let file_path = format!("{}/ui-upload.txt", folder);

        page.create_folder(driver, "objects", "ui-folder").await?;

        let dir = tempfile::tempdir()?;
        let local = dir.path().join("ui-upload.txt");
        tokio::fs::write(&local, format!("Uploaded by {}\n", slug)).await?;
        page.upload_file(driver, folder, &local).await?;

        let keys = ctx.s3.list_keys(&deposit.files.join(folder)).await?;
        ensure!(
            keys.iter().any(|k| k.key.ends_with("ui-upload.txt")),
            "upload missing from {}: {:?}",
            deposit.files.join(folder),
            keys.iter().map(|k| &k.key).collect::<Vec<_>>()
        );

        page.regenerate_mets(driver).await?;
        let mets = ctx.api.get_mets(&id).await?;
        let verifier = MetsVerifier::new(&mets.manifest);
        verifier.assert_directory(folder, &segments(folder))?;

        let shown = page.status(driver).await?;
        let reported = ctx.api.get_deposit(&id).await?.status.unwrap_or_default();
        ensure!(
            shown.eq_ignore_ascii_case(&reported),
            "UI shows status {:?}, API reports {:?}",
            shown,
            reported
        );
        verifier.assert_present(&file_path, &segments(&file_path), Some("text/plain"))?;

        page.lock(driver).await?;
        let lock_state = PageTextSource {
            driver,
            screen: &page,
            target: page.lock_indicator(),
        };
        wait_for_status(&lock_state, &StatusMatcher::pattern("Locked.*")?, &ctx.poll_policy()?).await?;
        page.unlock(driver).await?;

        page.delete_item(driver, &file_path, true).await?;
        let mets = ctx.api.get_mets(&id).await?;
        MetsVerifier::new(&mets.manifest).assert_absent(&file_path, &segments(&file_path))?;
        Ok(())
    }
}
