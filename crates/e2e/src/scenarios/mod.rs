//! Built-in scenarios

mod container;
mod deposit;
pub(crate) mod import;

pub use container::{ContainerLifecycle, ContainerUi};
pub use deposit::{DepositLock, DepositMets, DepositUi};
pub use import::ImportPreserve;

use bytes::Bytes;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use preserve_common::api::{DepositHandle, MetsItem, NewDeposit};
use preserve_common::storage::sha256_hex;

use crate::error::{E2eError, E2eResult};
use crate::load::{BulkFolders, LargeFile};
use crate::scenario::{expect_eq, Scenario, ScenarioContext};

/// Every scenario a suite file may name
pub fn builtin() -> Vec<Arc<dyn Scenario>> {
    vec![
        Arc::new(ContainerLifecycle),
        Arc::new(ContainerUi),
        Arc::new(DepositMets),
        Arc::new(DepositLock),
        Arc::new(DepositUi),
        Arc::new(ImportPreserve),
        Arc::new(BulkFolders),
        Arc::new(LargeFile),
    ]
}

/// Look up a scenario by name
pub fn find(registry: &[Arc<dyn Scenario>], name: &str) -> E2eResult<Arc<dyn Scenario>> {
    registry
        .iter()
        .find(|s| s.name() == name)
        .cloned()
        .ok_or_else(|| E2eError::UnknownScenario(name.to_string()))
}

/// Slug unique to one scenario run
pub(crate) fn unique_slug(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Create a deposit through the API and register it for teardown
pub(crate) async fn create_deposit(ctx: &ScenarioContext, new: NewDeposit) -> E2eResult<DepositHandle> {
    let deposit = ctx.api.create_deposit(&new).await?;
    ctx.register_deposit(deposit.short_id());
    Ok(deposit.handle()?)
}

/// Structural labels of a deposit-relative path
pub(crate) fn segments(relative: &str) -> Vec<&str> {
    relative.split('/').filter(|s| !s.is_empty()).collect()
}

/// Upload `data` with its checksum and record it in the deposit's METS.
///
/// Returns the SHA-256 of the content.
pub(crate) async fn stage_file(
    ctx: &ScenarioContext,
    deposit: &DepositHandle,
    relative: &str,
    content_type: &str,
    data: Bytes,
) -> E2eResult<String> {
    let digest = sha256_hex(&data);
    let size = data.len() as u64;

    let stored = ctx.s3.upload_bytes(&deposit.files, relative, data, true).await?;
    expect_eq(
        "object checksum metadata",
        Some(digest.clone()),
        ctx.s3.checksum_of(&stored).await?,
    )?;

    let mets = ctx.api.get_mets(&deposit.id).await?;
    let item = MetsItem::file(relative, content_type, Some(digest.clone()), size);
    ctx.api
        .add_to_mets(&deposit.id, mets.etag.as_deref(), &[item])
        .await?;
    info!("Staged {} ({} bytes) in deposit {}", relative, size, deposit.id);
    Ok(digest)
}
