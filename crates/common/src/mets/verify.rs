//! Structural assertions over a parsed manifest
//!
//! Every comparison is exact on whitespace-trimmed values. Generated METS is
//! deterministic, so there is no case folding or fuzzy matching.

use tracing::debug;

use super::model::{AdministrativeSection, Manifest, StructDiv, StructuralMatch};
use crate::ensure;
use crate::error::{Error, Result};

/// Label of the physical structure map's root division
pub const DEFAULT_ROOT_LABEL: &str = "__ROOT";

/// Identifiers of a file found in all three manifest regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentEntry {
    pub admin_id: String,
    pub file_id: String,
}

/// Assertions over one manifest snapshot
pub struct MetsVerifier<'a> {
    manifest: &'a Manifest,
    root_label: String,
}

impl<'a> MetsVerifier<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        Self {
            manifest,
            root_label: DEFAULT_ROOT_LABEL.to_string(),
        }
    }

    pub fn with_root_label(mut self, label: impl Into<String>) -> Self {
        self.root_label = label.into();
        self
    }

    /// Check that `path` has exactly one administrative section, or none.
    /// Returns the section id when it should exist.
    pub fn assert_administrative_entry(&self, path: &str, should_exist: bool) -> Result<Option<String>> {
        let matches = self.manifest.find_administrative_sections_by_path(path);
        if should_exist {
            ensure!(
                matches.len() == 1,
                "expected one amdSec with originalName '{}', found {}",
                path.trim(),
                matches.len()
            );
            debug!("amdSec {} holds {}", matches[0].id, path.trim());
            Ok(Some(matches[0].id.clone()))
        } else {
            ensure!(
                matches.is_empty(),
                "expected no amdSec with originalName '{}', found {} ({})",
                path.trim(),
                matches.len(),
                matches.iter().map(|s| s.id.as_str()).collect::<Vec<_>>().join(", ")
            );
            Ok(None)
        }
    }

    /// Check the file entry that references `admin_id` and is located at `path`
    pub fn assert_file_entry(&self, path: &str, admin_id: &str, expected_mime_type: Option<&str>) -> Result<String> {
        let path = path.trim();
        let entries: Vec<_> = self
            .manifest
            .find_file_entries_by_admin_id(admin_id)
            .into_iter()
            .filter(|f| f.hrefs.iter().any(|h| h == path))
            .collect();

        ensure!(
            entries.len() == 1,
            "expected one file with ADMID '{}' and href '{}', found {}",
            admin_id.trim(),
            path,
            entries.len()
        );
        let entry = entries[0];

        if let Some(expected) = expected_mime_type {
            ensure!(
                entry.mime_type.as_deref() == Some(expected.trim()),
                "file {} has MIMETYPE {:?}, expected '{}'",
                entry.id,
                entry.mime_type,
                expected.trim()
            );
        }
        Ok(entry.id.clone())
    }

    /// Descend the structure map by label from the root division, requiring
    /// exactly one match per level. Optionally check the final division's
    /// ADMID back-reference.
    pub fn assert_structural_path<S: AsRef<str>>(
        &self,
        segments: &[S],
        admin_id: Option<&str>,
    ) -> Result<&'a StructDiv> {
        let manifest: &'a Manifest = self.manifest;
        let node = match manifest.find_structural_node_by_path(&self.root_label, segments) {
            StructuralMatch::Found(node) => node,
            StructuralMatch::Missing { depth, label, candidates } => {
                return Err(Error::Assertion(format!(
                    "structMap path {}: expected one div labelled '{}' at depth {}, found {}",
                    display_path(&self.root_label, segments),
                    label,
                    depth,
                    candidates
                )))
            }
        };

        if let Some(expected) = admin_id {
            ensure!(
                node.admin_ids.iter().any(|id| id == expected.trim()),
                "div '{}' has ADMID {:?}, expected '{}'",
                node.label,
                node.admin_ids,
                expected.trim()
            );
        }
        Ok(node)
    }

    /// Check the single digest recorded for `path`
    pub fn assert_digest(&self, path: &str, algorithm: &str, expected_hex: &str) -> Result<()> {
        let section = self.single_section(path)?;

        ensure!(
            section.digest_algorithms.len() == 1,
            "amdSec {} has {} digest algorithm elements, expected 1",
            section.id,
            section.digest_algorithms.len()
        );
        ensure!(
            section.digest_values.len() == 1,
            "amdSec {} has {} digest value elements, expected 1",
            section.id,
            section.digest_values.len()
        );
        ensure!(
            section.digest_algorithms[0] == algorithm.trim(),
            "amdSec {} digest algorithm is '{}', expected '{}'",
            section.id,
            section.digest_algorithms[0],
            algorithm.trim()
        );
        ensure!(
            section.digest_values[0] == expected_hex.trim(),
            "amdSec {} digest is '{}', expected '{}'",
            section.id,
            section.digest_values[0],
            expected_hex.trim()
        );
        Ok(())
    }

    /// Check the PRONOM key recorded for `path`
    pub fn assert_format(&self, path: &str, pronom_key: &str) -> Result<()> {
        let section = self.single_section(path)?;
        ensure!(
            section.format_keys.len() == 1 && section.format_keys[0] == pronom_key.trim(),
            "amdSec {} has format keys {:?}, expected '{}'",
            section.id,
            section.format_keys,
            pronom_key.trim()
        );
        Ok(())
    }

    /// Check a file is present and consistently cross-referenced in the
    /// administrative, file and structural regions
    pub fn assert_present<S: AsRef<str>>(
        &self,
        path: &str,
        segments: &[S],
        expected_mime_type: Option<&str>,
    ) -> Result<PresentEntry> {
        let admin_id = self.single_section(path)?.id.clone();
        let file_id = self.assert_file_entry(path, &admin_id, expected_mime_type)?;
        let div = self.assert_structural_path(segments, Some(&admin_id))?;
        ensure!(
            div.file_ids.iter().any(|id| *id == file_id),
            "div '{}' does not point at file {} (fptr {:?})",
            div.label,
            file_id,
            div.file_ids
        );
        Ok(PresentEntry { admin_id, file_id })
    }

    /// Check a directory has its administrative section and division.
    /// Directories have no file entry.
    pub fn assert_directory<S: AsRef<str>>(&self, path: &str, segments: &[S]) -> Result<String> {
        let admin_id = self.single_section(path)?.id.clone();
        self.assert_structural_path(segments, Some(&admin_id))?;
        ensure!(
            self.manifest.find_file_entries_by_admin_id(&admin_id).is_empty(),
            "directory '{}' unexpectedly has a file entry",
            path.trim()
        );
        Ok(admin_id)
    }

    /// Check `path` is gone from all three regions
    pub fn assert_absent<S: AsRef<str>>(&self, path: &str, segments: &[S]) -> Result<()> {
        self.assert_administrative_entry(path, false)?;

        let files = self.manifest.find_file_entries_by_href(path);
        ensure!(
            files.is_empty(),
            "expected no file located at '{}', found {}",
            path.trim(),
            files.len()
        );

        if let StructuralMatch::Found(div) = self
            .manifest
            .find_structural_node_by_path(&self.root_label, segments)
        {
            return Err(Error::Assertion(format!(
                "structMap path {} still present (div {:?})",
                display_path(&self.root_label, segments),
                div.id
            )));
        }
        Ok(())
    }

    fn single_section(&self, path: &str) -> Result<&'a AdministrativeSection> {
        let manifest: &'a Manifest = self.manifest;
        let matches = manifest.find_administrative_sections_by_path(path);
        ensure!(
            matches.len() == 1,
            "expected one amdSec with originalName '{}', found {}",
            path.trim(),
            matches.len()
        );
        Ok(matches[0])
    }
}

fn display_path<S: AsRef<str>>(root: &str, segments: &[S]) -> String {
    std::iter::once(root)
        .chain(segments.iter().map(|s| s.as_ref()))
        .collect::<Vec<_>>()
        .join(" > ")
}
