//! S3 transfer helper for deposit working space
//!
//! Deposits expose an `s3://bucket/prefix` location. Uploads, copies and
//! listings go through `object_store`; every call completes before it
//! returns and nothing here retries.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::S3Config;
use crate::error::{Error, Result};

/// Object metadata key carrying the SHA-256 of an upload
pub const CHECKSUM_METADATA_KEY: &str = "sha256";

/// A bucket plus key prefix, parsed from an `s3://` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| Error::InvalidLocation(format!("not an s3:// URI: {}", uri)))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::InvalidLocation(format!("missing bucket in {}", uri)));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.trim_matches('/').to_string(),
        })
    }

    /// Location of `relative` beneath this one
    pub fn join(&self, relative: &str) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: join_key(&self.key, relative),
        }
    }
}

impl FromStr for S3Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Join key segments, tolerating stray leading and trailing slashes
pub fn join_key(prefix: &str, relative: &str) -> String {
    [prefix, relative]
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// An object returned by [`S3Transfer::list_keys`]
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub e_tag: Option<String>,
}

/// Compute the SHA-256 hex digest of data
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Supplies an object store per bucket
pub trait StoreProvider: Send + Sync {
    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>>;
}

/// Builds S3 clients on demand, one per bucket
pub struct S3StoreProvider {
    config: S3Config,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3StoreProvider {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }
}

impl StoreProvider for S3StoreProvider {
    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(&self.config.region);

        if let Some(endpoint) = &self.config.endpoint {
            info!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        if let Some(key) = &self.config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &self.config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

/// In-memory buckets for dry runs and tests
#[derive(Default)]
pub struct InMemoryStoreProvider {
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl InMemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreProvider for InMemoryStoreProvider {
    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let store = self
            .stores
            .lock()
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()) as Arc<dyn ObjectStore>)
            .clone();
        Ok(store)
    }
}

/// Uploads, copies and lists objects in deposit storage
#[derive(Clone)]
pub struct S3Transfer {
    provider: Arc<dyn StoreProvider>,
}

impl S3Transfer {
    pub fn new(provider: Arc<dyn StoreProvider>) -> Self {
        Self { provider }
    }

    /// Choose S3 or in-memory storage according to config
    pub fn from_config(config: &S3Config) -> Self {
        if config.in_memory {
            Self::new(Arc::new(InMemoryStoreProvider::new()))
        } else {
            Self::new(Arc::new(S3StoreProvider::new(config.clone())))
        }
    }

    /// Upload a local file to `relative_path` beneath `destination`.
    ///
    /// With `with_checksum` the SHA-256 is attached as object metadata so the
    /// service can cross-check it against the digest it derives from METS.
    pub async fn upload(
        &self,
        destination: &S3Location,
        local_path: &Path,
        relative_path: &str,
        with_checksum: bool,
    ) -> Result<S3Location> {
        let data = tokio::fs::read(local_path).await?;
        debug!("Uploading {} ({} bytes)", local_path.display(), data.len());
        self.upload_bytes(destination, relative_path, Bytes::from(data), with_checksum)
            .await
    }

    /// Upload in-memory content to `relative_path` beneath `destination`
    pub async fn upload_bytes(
        &self,
        destination: &S3Location,
        relative_path: &str,
        data: Bytes,
        with_checksum: bool,
    ) -> Result<S3Location> {
        let target = destination.join(relative_path);
        let store = self.provider.store(&target.bucket)?;

        let mut attributes = Attributes::new();
        if with_checksum {
            let digest = sha256_hex(&data);
            attributes.insert(Attribute::Metadata(CHECKSUM_METADATA_KEY.into()), digest.into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        store
            .put_opts(&ObjectPath::from(target.key.as_str()), PutPayload::from(data), opts)
            .await?;
        info!("Uploaded {}", target);
        Ok(target)
    }

    /// Copy an object; server-side within a bucket, get+put across buckets
    pub async fn copy(&self, source: &S3Location, dest_bucket: &str, dest_key: &str) -> Result<S3Location> {
        let dest = S3Location {
            bucket: dest_bucket.to_string(),
            key: join_key("", dest_key),
        };
        let from = ObjectPath::from(source.key.as_str());
        let to = ObjectPath::from(dest.key.as_str());

        let source_store = self.provider.store(&source.bucket)?;
        if source.bucket == dest.bucket {
            source_store.copy(&from, &to).await?;
        } else {
            let data = source_store.get(&from).await?.bytes().await?;
            let dest_store = self.provider.store(&dest.bucket)?;
            dest_store.put(&to, PutPayload::from(data)).await?;
        }
        info!("Copied {} to {}", source, dest);
        Ok(dest)
    }

    /// List every object beneath `prefix`
    pub async fn list_keys(&self, prefix: &S3Location) -> Result<Vec<ObjectDescriptor>> {
        let store = self.provider.store(&prefix.bucket)?;
        let path = ObjectPath::from(prefix.key.as_str());
        let list_prefix = if prefix.key.is_empty() { None } else { Some(&path) };

        let objects: Vec<_> = store.list(list_prefix).try_collect().await?;
        let mut descriptors: Vec<ObjectDescriptor> = objects
            .into_iter()
            .map(|meta| ObjectDescriptor {
                key: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: meta.last_modified,
                e_tag: meta.e_tag,
            })
            .collect();
        descriptors.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(descriptors)
    }

    /// Read an object back in full
    pub async fn get_bytes(&self, location: &S3Location) -> Result<Bytes> {
        let store = self.provider.store(&location.bucket)?;
        Ok(store
            .get(&ObjectPath::from(location.key.as_str()))
            .await?
            .bytes()
            .await?)
    }

    /// Checksum metadata recorded on an object, if any
    pub async fn checksum_of(&self, location: &S3Location) -> Result<Option<String>> {
        let store = self.provider.store(&location.bucket)?;
        let result = store.get(&ObjectPath::from(location.key.as_str())).await?;
        Ok(result
            .attributes
            .get(&Attribute::Metadata(CHECKSUM_METADATA_KEY.into()))
            .map(|value| value.to_string()))
    }

    pub async fn delete(&self, location: &S3Location) -> Result<()> {
        let store = self.provider.store(&location.bucket)?;
        store.delete(&ObjectPath::from(location.key.as_str())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> S3Transfer {
        S3Transfer::new(Arc::new(InMemoryStoreProvider::new()))
    }

    #[test]
    fn test_parse_location() {
        let loc = S3Location::parse("s3://dlip-deposits/deposits/abc123/").unwrap();
        assert_eq!(loc.bucket, "dlip-deposits");
        assert_eq!(loc.key, "deposits/abc123");
        assert_eq!(loc.to_string(), "s3://dlip-deposits/deposits/abc123");
    }

    #[test]
    fn test_parse_bucket_only() {
        let loc: S3Location = "s3://bucket".parse().unwrap();
        assert_eq!(loc.bucket, "bucket");
        assert_eq!(loc.key, "");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(S3Location::parse("https://bucket/key").is_err());
        assert!(S3Location::parse("s3:///key").is_err());
    }

    #[test]
    fn test_join_key_is_forgiving() {
        assert_eq!(join_key("deposits/abc/", "/objects/file.txt"), "deposits/abc/objects/file.txt");
        assert_eq!(join_key("", "objects//a.txt/"), "objects/a.txt");
        assert_eq!(join_key("/a/", ""), "a");
    }

    #[tokio::test]
    async fn test_upload_with_checksum() {
        let s3 = transfer();
        let dest = S3Location::parse("s3://deposits/abc").unwrap();

        let target = s3
            .upload_bytes(&dest, "objects/hello.txt", Bytes::from_static(b"hello"), true)
            .await
            .unwrap();

        assert_eq!(target.key, "abc/objects/hello.txt");
        assert_eq!(s3.get_bytes(&target).await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(
            s3.checksum_of(&target).await.unwrap().as_deref(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }

    #[tokio::test]
    async fn test_upload_without_checksum() {
        let s3 = transfer();
        let dest = S3Location::parse("s3://deposits/abc").unwrap();
        let target = s3
            .upload_bytes(&dest, "a.txt", Bytes::from_static(b"a"), false)
            .await
            .unwrap();
        assert_eq!(s3.checksum_of(&target).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upload_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("report.pdf");
        std::fs::write(&local, b"%PDF-1.4").unwrap();

        let s3 = transfer();
        let dest = S3Location::parse("s3://deposits/xyz/").unwrap();
        let target = s3.upload(&dest, &local, "objects/report.pdf", false).await.unwrap();
        assert_eq!(target.to_string(), "s3://deposits/xyz/objects/report.pdf");
    }

    #[tokio::test]
    async fn test_copy_within_and_across_buckets() {
        let s3 = transfer();
        let src = s3
            .upload_bytes(
                &S3Location::parse("s3://source/fixtures").unwrap(),
                "big.bin",
                Bytes::from_static(b"0123456789"),
                false,
            )
            .await
            .unwrap();

        let same = s3.copy(&src, "source", "/copies/big.bin").await.unwrap();
        assert_eq!(s3.get_bytes(&same).await.unwrap().len(), 10);

        let other = s3.copy(&src, "deposits", "abc/objects/big.bin").await.unwrap();
        assert_eq!(other.bucket, "deposits");
        assert_eq!(s3.get_bytes(&other).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_list_keys_under_prefix() {
        let s3 = transfer();
        let dest = S3Location::parse("s3://deposits/abc").unwrap();
        for name in ["objects/b.txt", "objects/a.txt", "mets.xml"] {
            s3.upload_bytes(&dest, name, Bytes::from_static(b"x"), false)
                .await
                .unwrap();
        }
        s3.upload_bytes(
            &S3Location::parse("s3://deposits/other").unwrap(),
            "c.txt",
            Bytes::from_static(b"x"),
            false,
        )
        .await
        .unwrap();

        let keys: Vec<String> = s3
            .list_keys(&dest.join("objects"))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["abc/objects/a.txt", "abc/objects/b.txt"]);

        assert_eq!(s3.list_keys(&dest).await.unwrap().len(), 3);
    }
}
