//! Typed METS model

use roxmltree::{Document, Node};

use crate::error::{Error, Result};

/// An `amdSec` and the PREMIS values the harness inspects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdministrativeSection {
    pub id: String,
    /// `premis:originalName`, the logical path within the deposit
    pub original_name: Option<String>,
    pub digest_algorithms: Vec<String>,
    pub digest_values: Vec<String>,
    /// PRONOM keys from `premis:formatRegistryKey`
    pub format_keys: Vec<String>,
    pub sizes: Vec<String>,
}

/// A `mets:file` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: String,
    pub admin_ids: Vec<String>,
    pub mime_type: Option<String>,
    /// `xlink:href` of each `FLocat`
    pub hrefs: Vec<String>,
}

/// A division of the structure map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDiv {
    pub id: Option<String>,
    pub label: String,
    pub div_type: Option<String>,
    pub admin_ids: Vec<String>,
    /// `FILEID`s of the division's `fptr` children
    pub file_ids: Vec<String>,
    pub children: Vec<StructDiv>,
}

/// Outcome of descending the structure map by label
#[derive(Debug)]
pub enum StructuralMatch<'a> {
    Found(&'a StructDiv),
    /// Descent stopped at `depth` (0 is the root) because `candidates`
    /// divisions, rather than exactly one, carried `label`
    Missing {
        depth: usize,
        label: String,
        candidates: usize,
    },
}

/// A parsed METS document. Immutable; re-fetch to observe changes.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub admin_sections: Vec<AdministrativeSection>,
    pub files: Vec<FileEntry>,
    /// Root division of the physical structure map
    pub structure: Option<StructDiv>,
}

impl Manifest {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "mets" {
            return Err(Error::Mets(format!(
                "root element is <{}>, expected <mets>",
                root.tag_name().name()
            )));
        }

        let admin_sections = root
            .descendants()
            .filter(|n| is(n, "amdSec"))
            .map(parse_admin_section)
            .collect::<Result<Vec<_>>>()?;

        let files = root
            .descendants()
            .filter(|n| is(n, "fileSec"))
            .flat_map(|sec| sec.descendants().filter(|n| is(n, "file")))
            .map(parse_file)
            .collect::<Result<Vec<_>>>()?;

        let struct_maps: Vec<Node> = root.children().filter(|n| is(n, "structMap")).collect();
        let struct_map = struct_maps
            .iter()
            .find(|n| n.attribute("TYPE").map(str::trim) == Some("PHYSICAL"))
            .or_else(|| struct_maps.first());
        let structure = struct_map
            .and_then(|map| map.children().find(|n| is(n, "div")))
            .map(parse_div);

        Ok(Self {
            admin_sections,
            files,
            structure,
        })
    }

    /// Administrative sections whose original name equals `path`
    pub fn find_administrative_sections_by_path(&self, path: &str) -> Vec<&AdministrativeSection> {
        let path = path.trim();
        self.admin_sections
            .iter()
            .filter(|s| s.original_name.as_deref() == Some(path))
            .collect()
    }

    /// File entries referencing the administrative section `admin_id`
    pub fn find_file_entries_by_admin_id(&self, admin_id: &str) -> Vec<&FileEntry> {
        let admin_id = admin_id.trim();
        self.files
            .iter()
            .filter(|f| f.admin_ids.iter().any(|id| id == admin_id))
            .collect()
    }

    /// File entries whose location is `path`, regardless of ADMID
    pub fn find_file_entries_by_href(&self, path: &str) -> Vec<&FileEntry> {
        let path = path.trim();
        self.files
            .iter()
            .filter(|f| f.hrefs.iter().any(|h| h == path))
            .collect()
    }

    /// Descend from the division labelled `root_label`, matching one
    /// segment per level. Each level must have exactly one match.
    pub fn find_structural_node_by_path<S: AsRef<str>>(
        &self,
        root_label: &str,
        segments: &[S],
    ) -> StructuralMatch<'_> {
        let root = match &self.structure {
            Some(root) if root.label == root_label.trim() => root,
            _ => {
                return StructuralMatch::Missing {
                    depth: 0,
                    label: root_label.to_string(),
                    candidates: 0,
                }
            }
        };

        let mut node = root;
        for (i, segment) in segments.iter().enumerate() {
            let label = segment.as_ref().trim();
            let matches: Vec<&StructDiv> = node.children.iter().filter(|c| c.label == label).collect();
            match matches.as_slice() {
                [only] => node = *only,
                _ => {
                    return StructuralMatch::Missing {
                        depth: i + 1,
                        label: label.to_string(),
                        candidates: matches.len(),
                    }
                }
            }
        }
        StructuralMatch::Found(node)
    }
}

fn is(node: &Node, local_name: &str) -> bool {
    node.is_element() && node.tag_name().name() == local_name
}

fn required_attr(node: &Node, name: &str) -> Result<String> {
    node.attribute(name)
        .map(|v| v.trim().to_string())
        .ok_or_else(|| {
            Error::Mets(format!(
                "<{}> without {} attribute",
                node.tag_name().name(),
                name
            ))
        })
}

fn id_list(node: &Node, name: &str) -> Vec<String> {
    node.attribute(name)
        .map(|v| v.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

fn texts(node: &Node, local_name: &str) -> Vec<String> {
    node.descendants()
        .filter(|n| is(n, local_name))
        .map(|n| n.text().unwrap_or_default().trim().to_string())
        .collect()
}

fn parse_admin_section(node: Node) -> Result<AdministrativeSection> {
    Ok(AdministrativeSection {
        id: required_attr(&node, "ID")?,
        original_name: texts(&node, "originalName").into_iter().next(),
        digest_algorithms: texts(&node, "messageDigestAlgorithm"),
        digest_values: texts(&node, "messageDigest"),
        format_keys: texts(&node, "formatRegistryKey"),
        sizes: texts(&node, "size"),
    })
}

fn parse_file(node: Node) -> Result<FileEntry> {
    let hrefs = node
        .children()
        .filter(|n| is(n, "FLocat"))
        .filter_map(|n| n.attributes().find(|a| a.name() == "href"))
        .map(|a| a.value().trim().to_string())
        .collect();

    Ok(FileEntry {
        id: required_attr(&node, "ID")?,
        admin_ids: id_list(&node, "ADMID"),
        mime_type: node.attribute("MIMETYPE").map(|v| v.trim().to_string()),
        hrefs,
    })
}

fn parse_div(node: Node) -> StructDiv {
    StructDiv {
        id: node.attribute("ID").map(|v| v.trim().to_string()),
        label: node.attribute("LABEL").unwrap_or_default().trim().to_string(),
        div_type: node.attribute("TYPE").map(|v| v.trim().to_string()),
        admin_ids: id_list(&node, "ADMID"),
        file_ids: node
            .children()
            .filter(|n| is(n, "fptr"))
            .flat_map(|n| id_list(&n, "FILEID"))
            .collect(),
        children: node.children().filter(|n| is(n, "div")).map(parse_div).collect(),
    }
}
