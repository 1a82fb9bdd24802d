//! Deposit lifecycle: creation, locking, METS and import jobs

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MATCH};
use reqwest::{Method, StatusCode};
use tracing::{info, warn};

use super::models::{Deposit, DepositPatch, ImportJob, ImportJobResult, MetsItem, NewDeposit};
use super::{check_status, ApiContext};
use crate::error::{Error, Result};
use crate::mets::Manifest;
use crate::poll::{Observation, StatusSource};

/// Result of a lock request.
///
/// A 409 means another identity holds the lock and maps to `Conflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    Conflict,
}

impl LockOutcome {
    /// Fail unless this request obtained the lock
    pub fn expect_acquired(self, deposit_id: &str) -> Result<()> {
        match self {
            LockOutcome::Acquired => Ok(()),
            LockOutcome::Conflict => Err(Error::Assertion(format!(
                "lock on deposit {} should have been granted but returned 409",
                deposit_id
            ))),
        }
    }

    /// Fail unless the lock was refused because someone else holds it
    pub fn expect_conflict(self, deposit_id: &str) -> Result<()> {
        match self {
            LockOutcome::Conflict => Ok(()),
            LockOutcome::Acquired => Err(Error::Assertion(format!(
                "lock on deposit {} should have been refused with 409",
                deposit_id
            ))),
        }
    }
}

/// A deposit's METS, with the ETag required to modify it
#[derive(Debug, Clone)]
pub struct MetsDocument {
    pub etag: Option<String>,
    pub xml: String,
    pub manifest: Manifest,
}

impl ApiContext {
    fn deposit_url(&self, id: &str, suffix: &str) -> String {
        let base = self.url(&format!("deposits/{}", id));
        if suffix.is_empty() {
            base
        } else {
            format!("{}/{}", base, suffix)
        }
    }

    /// `POST /deposits`
    pub async fn create_deposit(&self, new: &NewDeposit) -> Result<Deposit> {
        let url = self.url("deposits");
        let resp = self.request(Method::POST, &url).await?.json(new).send().await?;
        let deposit: Deposit = check_status(resp, &Method::POST, &url).await?.json().await?;
        info!("Created deposit {} at {}", deposit.short_id(), deposit.files);
        Ok(deposit)
    }

    /// `GET /deposits/{id}`
    pub async fn get_deposit(&self, id: &str) -> Result<Deposit> {
        self.get_json(&self.deposit_url(id, "")).await
    }

    /// `PATCH /deposits/{id}`
    pub async fn patch_deposit(&self, id: &str, patch: &DepositPatch) -> Result<Deposit> {
        let url = self.deposit_url(id, "");
        let resp = self.request(Method::PATCH, &url).await?.json(patch).send().await?;
        Ok(check_status(resp, &Method::PATCH, &url).await?.json().await?)
    }

    /// `DELETE /deposits/{id}`
    pub async fn delete_deposit(&self, id: &str) -> Result<()> {
        let url = self.deposit_url(id, "");
        let resp = self.request(Method::DELETE, &url).await?.send().await?;
        check_status(resp, &Method::DELETE, &url).await?;
        info!("Deleted deposit {}", id);
        Ok(())
    }

    /// `POST /deposits/{id}/lock[?force=true]`
    pub async fn lock_deposit(&self, id: &str, force: bool) -> Result<LockOutcome> {
        let mut url = self.deposit_url(id, "lock");
        if force {
            url.push_str("?force=true");
        }
        let resp = self.request(Method::POST, &url).await?.send().await?;
        if resp.status() == StatusCode::CONFLICT {
            warn!("Deposit {} is locked by another identity", id);
            return Ok(LockOutcome::Conflict);
        }
        check_status(resp, &Method::POST, &url).await?;
        info!("{} locked deposit {}", self.identity(), id);
        Ok(LockOutcome::Acquired)
    }

    /// `DELETE /deposits/{id}/lock`
    pub async fn unlock_deposit(&self, id: &str) -> Result<()> {
        let url = self.deposit_url(id, "lock");
        let resp = self.request(Method::DELETE, &url).await?.send().await?;
        check_status(resp, &Method::DELETE, &url).await?;
        Ok(())
    }

    /// `GET /deposits/{id}/mets`, parsed
    pub async fn get_mets(&self, id: &str) -> Result<MetsDocument> {
        let url = self.deposit_url(id, "mets");
        let resp = self.request(Method::GET, &url).await?.send().await?;
        let resp = check_status(resp, &Method::GET, &url).await?;
        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let xml = resp.text().await?;
        let manifest = Manifest::parse(&xml)?;
        Ok(MetsDocument { etag, xml, manifest })
    }

    /// `POST /deposits/{id}/mets` adding items, guarded by the METS ETag
    pub async fn add_to_mets(&self, id: &str, etag: Option<&str>, items: &[MetsItem]) -> Result<()> {
        let url = self.deposit_url(id, "mets");
        let mut req = self.request(Method::POST, &url).await?.json(items);
        if let Some(etag) = etag {
            req = req.header(IF_MATCH, etag);
        }
        let resp = req.send().await?;
        check_status(resp, &Method::POST, &url).await?;
        info!("Added {} item(s) to METS of deposit {}", items.len(), id);
        Ok(())
    }

    /// `GET /deposits/{id}/importjobs/diff`
    pub async fn import_diff(&self, id: &str) -> Result<ImportJob> {
        self.get_json(&self.deposit_url(id, "importjobs/diff")).await
    }

    /// `POST /deposits/{id}/importjobs`
    pub async fn run_import(&self, id: &str, job: &ImportJob) -> Result<ImportJobResult> {
        let url = self.deposit_url(id, "importjobs");
        let resp = self.request(Method::POST, &url).await?.json(job).send().await?;
        let result: ImportJobResult = check_status(resp, &Method::POST, &url).await?.json().await?;
        info!("Import job {} for deposit {} is {}", result.id, id, result.status);
        Ok(result)
    }

    /// Fetch an import job result by its URI
    pub async fn get_import_result(&self, uri: &str) -> Result<ImportJobResult> {
        self.get_json(uri).await
    }
}

/// Observes the status of an executed import job
pub struct ImportJobStatusSource<'a> {
    pub api: &'a ApiContext,
    pub result_uri: String,
}

#[async_trait]
impl<'a> StatusSource for ImportJobStatusSource<'a> {
    fn describe(&self) -> String {
        format!("import job {}", self.result_uri)
    }

    async fn observe(&self) -> Result<Observation> {
        let result = self.api.get_import_result(&self.result_uri).await?;
        Ok(Observation::Status(result.status))
    }
}

/// Observes a deposit's status field
pub struct DepositStatusSource<'a> {
    pub api: &'a ApiContext,
    pub deposit_id: String,
}

#[async_trait]
impl<'a> StatusSource for DepositStatusSource<'a> {
    fn describe(&self) -> String {
        format!("deposit {}", self.deposit_id)
    }

    async fn observe(&self) -> Result<Observation> {
        let deposit = self.api.get_deposit(&self.deposit_id).await?;
        Ok(match deposit.status {
            Some(status) => Observation::Status(status),
            None => Observation::Missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::poll::{wait_for_status, PollPolicy, StatusMatcher};
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lock_conflict_is_an_outcome() {
        let server = MockServer::start_async().await;
        let api = context(&server).await;
        let mut held = server
            .mock_async(|when, then| {
                when.method(POST).path("/deposits/abc/lock");
                then.status(409).body("locked by other-client");
            })
            .await;

        let plain = api.lock_deposit("abc", false).await.unwrap();
        assert_eq!(plain, LockOutcome::Conflict);
        plain.expect_conflict("abc").unwrap();
        assert!(plain.expect_acquired("abc").is_err());
        held.delete_async().await;

        let forced = server
            .mock_async(|when, then| {
                when.method(POST).path("/deposits/abc/lock").query_param("force", "true");
                then.status(204);
            })
            .await;
        api.lock_deposit("abc", true).await.unwrap().expect_acquired("abc").unwrap();
        forced.assert_async().await;
    }

    #[tokio::test]
    async fn test_other_lock_failures_are_errors() {
        let server = MockServer::start_async().await;
        let api = context(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/deposits/abc/lock");
                then.status(403);
            })
            .await;

        let err = api.lock_deposit("abc", false).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_get_mets_keeps_etag() {
        let server = MockServer::start_async().await;
        let api = context(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/deposits/abc/mets");
                then.status(200)
                    .header("etag", "\"v1\"")
                    .header("content-type", "application/xml")
                    .body(r#"<mets:mets xmlns:mets="http://www.loc.gov/METS/"><mets:structMap TYPE="PHYSICAL"><mets:div LABEL="__ROOT"/></mets:structMap></mets:mets>"#);
            })
            .await;
        let post = server
            .mock_async(|when, then| {
                when.method(POST).path("/deposits/abc/mets").header("if-match", "\"v1\"");
                then.status(200);
            })
            .await;

        let doc = api.get_mets("abc").await.unwrap();
        assert_eq!(doc.etag.as_deref(), Some("\"v1\""));
        assert_eq!(doc.manifest.structure.unwrap().label, "__ROOT");

        api.add_to_mets("abc", doc.etag.as_deref(), &[MetsItem::directory("objects")])
            .await
            .unwrap();
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_import_job_round_trip() {
        let server = MockServer::start_async().await;
        let api = context(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/deposits/abc/importjobs/diff");
                then.status(200).json_body(json!({
                    "type": "ImportJob",
                    "binariesToAdd": [{ "@id": "objects/a.txt" }]
                }));
            })
            .await;
        let result_uri = server.url("/deposits/abc/importjobs/results/r1");
        let run = server
            .mock_async(|when, then| {
                when.method(POST).path("/deposits/abc/importjobs");
                then.status(201).json_body(json!({
                    "@id": server.url("/deposits/abc/importjobs/results/r1"),
                    "status": "waiting"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/deposits/abc/importjobs/results/r1");
                then.status(200).json_body(json!({
                    "@id": "r1",
                    "status": "completedWithErrors",
                    "errors": [{ "message": "x" }]
                }));
            })
            .await;

        let job = api.import_diff("abc").await.unwrap();
        let result = api.run_import("abc", &job).await.unwrap();
        assert_eq!(result.id, result_uri);
        run.assert_async().await;

        let source = ImportJobStatusSource {
            api: &api,
            result_uri: result.id.clone(),
        };
        let outcome = wait_for_status(
            &source,
            &StatusMatcher::pattern("completed.*").unwrap(),
            &PollPolicy::from_millis(10, 1000).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, "completedWithErrors");
    }
}
