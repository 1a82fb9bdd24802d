//! Load scenarios: bulk folder creation and large-file ingestion

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use preserve_common::api::NewDeposit;
use preserve_common::ensure;
use preserve_common::mets::MetsVerifier;

use crate::error::{E2eError, E2eResult};
use crate::pages::DepositPage;
use crate::scenario::{expect_eq, Scenario, ScenarioContext};
use crate::scenarios::import::{import_and_wait, new_archival_group_deposit};
use crate::scenarios::{create_deposit, segments, stage_file, unique_slug};
use crate::suite::Params;

/// Latency summary of a batch of operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ms: u64,
    pub mean_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

impl LatencyStats {
    /// `None` for an empty sample
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut ms: Vec<u64> = samples.iter().map(|d| d.as_millis() as u64).collect();
        ms.sort_unstable();

        // Nearest-rank percentile
        let rank = (ms.len() * 95).div_ceil(100);
        let total: u64 = ms.iter().sum();
        Some(Self {
            count: ms.len(),
            min_ms: ms[0],
            mean_ms: total / ms.len() as u64,
            p95_ms: ms[rank.saturating_sub(1)],
            max_ms: ms[ms.len() - 1],
        })
    }
}

/// Create many folders in one deposit through the UI
pub struct BulkFolders;

#[async_trait]
impl Scenario for BulkFolders {
    fn name(&self) -> &'static str {
        "bulk-folders"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["load", "ui"]
    }

    fn long_running(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &ScenarioContext, params: &Params) -> E2eResult<()> {
        let count = params.u64_or("count", 20)? as usize;
        let parent = params.str_or("parent", "objects")?;
        if count == 0 {
            return Err(E2eError::InvalidParam {
                name: "count".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let deposit = create_deposit(ctx, NewDeposit::default()).await?;
        let page = DepositPage::new(&deposit.id);
        let names: Vec<String> = (0..count).map(|i| format!("folder-{:04}", i)).collect();

        let mut samples = Vec::with_capacity(count);
        for name in &names {
            let start = Instant::now();
            page.create_folder(ctx.driver(), parent, name).await?;
            samples.push(start.elapsed());
            debug!("Created {}/{} in {:?}", parent, name, start.elapsed());
        }

        let listed = page.listed_items(ctx.driver()).await?;
        let missing: Vec<&String> = names.iter().filter(|n| !listed.contains(n)).collect();
        ensure!(missing.is_empty(), "folders missing from listing: {:?}", missing);

        let mets = ctx.api.get_mets(&deposit.id).await?;
        let verifier = MetsVerifier::new(&mets.manifest);
        for name in &names {
            let path = format!("{}/{}", parent, name);
            verifier.assert_directory(&path, &segments(&path))?;
        }

        if let Some(stats) = LatencyStats::from_samples(&samples) {
            info!(
                "Created {} folders: min {} ms, mean {} ms, p95 {} ms, max {} ms",
                stats.count, stats.min_ms, stats.mean_ms, stats.p95_ms, stats.max_ms
            );
            ctx.record("folder_creation", &stats)?;
        }
        Ok(())
    }
}

/// Upload, import and verify one large generated file
pub struct LargeFile;

#[async_trait]
impl Scenario for LargeFile {
    fn name(&self) -> &'static str {
        "large-file"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["load", "api", "import"]
    }

    fn long_running(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &ScenarioContext, params: &Params) -> E2eResult<()> {
        let size_mib = params.u64_or("size_mib", 100)?;
        let len = mib_to_bytes(size_mib)?;
        ctx.ensure_test_root().await?;
        let slug = unique_slug("playwright-large-file");
        let group_path = ctx.api.test_path(&slug);
        let relative = format!("objects/large-{}mib.bin", size_mib);

        let data = generate_content(len, &slug);
        let deposit = new_archival_group_deposit(ctx, &group_path, &slug).await?;

        let upload_start = Instant::now();
        let digest = stage_file(ctx, &deposit, &relative, "application/octet-stream", data).await?;
        let upload = upload_start.elapsed();

        let mets = ctx.api.get_mets(&deposit.id).await?;
        MetsVerifier::new(&mets.manifest).assert_digest(&relative, "SHA256", &digest)?;

        let import_start = Instant::now();
        import_and_wait(&ctx.api, &deposit, &ctx.import_policy()?).await?;
        let import = import_start.elapsed();
        ctx.register_container(&group_path);

        let folder = ctx.api.get_container(&format!("{}/objects", group_path)).await?;
        let binary = folder
            .binaries
            .iter()
            .find(|b| b.id.ends_with(&relative))
            .ok_or_else(|| E2eError::AssertionFailed(format!("{} missing from {}", relative, group_path)))?;
        expect_eq(
            "preserved digest",
            Some(digest.to_lowercase()),
            binary.digest.as_ref().map(|d| d.to_lowercase()),
        )?;

        info!(
            "{} MiB file uploaded in {:?}, imported in {:?}",
            size_mib, upload, import
        );
        ctx.record("upload_ms", &(upload.as_millis() as u64))?;
        ctx.record("import_ms", &(import.as_millis() as u64))?;
        Ok(())
    }
}

/// Byte length of a `size_mib` parameter, rejecting sizes this host cannot address
fn mib_to_bytes(size_mib: u64) -> E2eResult<u64> {
    size_mib
        .checked_mul(1024 * 1024)
        .filter(|len| usize::try_from(*len).is_ok())
        .ok_or_else(|| E2eError::InvalidParam {
            name: "size_mib".to_string(),
            reason: format!("{} MiB does not fit in memory on this host", size_mib),
        })
}

/// Deterministic, incompressible-enough content seeded by `seed`
fn generate_content(len: u64, seed: &str) -> Bytes {
    let seed_bytes = seed.as_bytes();
    let mut state: u32 = seed_bytes
        .iter()
        .fold(0x811c_9dc5, |h, b| (h ^ u32::from(*b)).wrapping_mul(0x0100_0193));
    let mut data = Vec::with_capacity(len as usize);
    for _ in 0..len {
        // xorshift32
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        data.push((state & 0xff) as u8);
    }
    Bytes::from(data)
}
