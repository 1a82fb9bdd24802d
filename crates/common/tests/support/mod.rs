//! Manifest fixtures shaped like the ones the deposit service generates

use std::collections::{BTreeMap, BTreeSet};

struct FileSpec {
    mime_type: String,
    sha256: String,
}

/// Builds a METS document from a set of deposit-relative paths.
///
/// Every ancestor of a file gets its own directory section and division.
pub struct MetsBuilder {
    root_label: String,
    directories: BTreeSet<String>,
    files: BTreeMap<String, FileSpec>,
}

impl MetsBuilder {
    pub fn new() -> Self {
        Self {
            root_label: "__ROOT".to_string(),
            directories: BTreeSet::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn root_label(mut self, label: &str) -> Self {
        self.root_label = label.to_string();
        self
    }

    pub fn directory(mut self, path: &str) -> Self {
        self.add_ancestors(path);
        self.directories.insert(path.to_string());
        self
    }

    pub fn file(mut self, path: &str, mime_type: &str, sha256: &str) -> Self {
        self.add_ancestors(path);
        self.files.insert(
            path.to_string(),
            FileSpec {
                mime_type: mime_type.to_string(),
                sha256: sha256.to_string(),
            },
        );
        self
    }

    pub fn without(mut self, path: &str) -> Self {
        self.files.remove(path);
        self.directories.remove(path);
        self
    }

    fn add_ancestors(&mut self, path: &str) {
        let parts: Vec<&str> = path.split('/').collect();
        for depth in 1..parts.len() {
            self.directories.insert(parts[..depth].join("/"));
        }
    }

    pub fn build(&self) -> String {
        let mut xml = String::from(
            r#"<mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:premis="http://www.loc.gov/premis/v3" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
        );

        for dir in &self.directories {
            xml.push_str(&format!(
                r#"<mets:amdSec ID="{}"><mets:techMD><mets:mdWrap><mets:xmlData><premis:object><premis:originalName>{}</premis:originalName></premis:object></mets:xmlData></mets:mdWrap></mets:techMD></mets:amdSec>"#,
                admin_id(dir),
                dir
            ));
        }
        for (path, file) in &self.files {
            xml.push_str(&format!(
                r#"<mets:amdSec ID="{}"><mets:techMD><mets:mdWrap><mets:xmlData><premis:object><premis:objectCharacteristics><premis:fixity><premis:messageDigestAlgorithm>SHA256</premis:messageDigestAlgorithm><premis:messageDigest>{}</premis:messageDigest></premis:fixity></premis:objectCharacteristics><premis:originalName>{}</premis:originalName></premis:object></mets:xmlData></mets:mdWrap></mets:techMD></mets:amdSec>"#,
                admin_id(path),
                file.sha256,
                path
            ));
        }

        xml.push_str(r#"<mets:fileSec><mets:fileGrp USE="OBJECTS">"#);
        for (path, file) in &self.files {
            xml.push_str(&format!(
                r#"<mets:file ID="{}" ADMID="{}" MIMETYPE="{}"><mets:FLocat LOCTYPE="URL" xlink:href="{}"/></mets:file>"#,
                file_id(path),
                admin_id(path),
                file.mime_type,
                path
            ));
        }
        xml.push_str("</mets:fileGrp></mets:fileSec>");

        xml.push_str(&format!(
            r#"<mets:structMap TYPE="PHYSICAL"><mets:div LABEL="{}">"#,
            self.root_label
        ));
        self.render_children("", &mut xml);
        xml.push_str("</mets:div></mets:structMap></mets:mets>");
        xml
    }

    fn render_children(&self, parent: &str, xml: &mut String) {
        let children = self
            .directories
            .iter()
            .chain(self.files.keys())
            .filter(|path| parent_of(path) == parent);

        for path in children {
            let label = path.rsplit('/').next().unwrap_or(path);
            xml.push_str(&format!(
                r#"<mets:div LABEL="{}" ADMID="{}">"#,
                label,
                admin_id(path)
            ));
            if self.files.contains_key(path) {
                xml.push_str(&format!(r#"<mets:fptr FILEID="{}"/>"#, file_id(path)));
            } else {
                self.render_children(path, xml);
            }
            xml.push_str("</mets:div>");
        }
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn admin_id(path: &str) -> String {
    format!("ADM_{}", path.replace('/', "_"))
}

fn file_id(path: &str) -> String {
    format!("FILE_{}", path.replace('/', "_"))
}
