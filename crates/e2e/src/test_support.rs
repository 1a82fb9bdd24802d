//! Fixtures for scenario tests: a context wired to a mock server, and a
//! stateful stand-in for the deposit service and its UI

use httpmock::prelude::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use preserve_common::api::ApiContext;
use preserve_common::auth::TokenProvider;
use preserve_common::config::{ApiConfig, ClientCredentials, HarnessConfig};
use preserve_common::storage::{InMemoryStoreProvider, S3Transfer};

use crate::locator::{Locator, Role};
use crate::pages::DepositPage;
use crate::playwright::{Interaction, RecordingDriver, Reply, Script};
use crate::scenario::ScenarioContext;

const TIMESTAMP: &str = "2024-05-01T10:00:00Z";

/// Context whose API lives on `server`, with in-memory storage and a
/// recording driver.
///
/// The `primary` and `secondary` identities are issued the tokens
/// `primary-token` and `secondary-token`.
pub async fn context(server: &MockServer, driver: Arc<RecordingDriver>) -> ScenarioContext {
    for client_id in ["primary", "secondary"] {
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .form_urlencoded_tuple("client_id", client_id);
                then.status(200).json_body(json!({
                    "access_token": format!("{}-token", client_id),
                    "expires_in": 3600
                }));
            })
            .await;
    }

    let mut config = HarnessConfig::default();
    config.api = ApiConfig {
        base_url: server.base_url(),
        storage_url: server.url("/storage"),
        iiif_url: server.url("/iiif"),
        ..Default::default()
    };

    let http = reqwest::Client::new();
    let identity = |id: &str| {
        Arc::new(TokenProvider::with_endpoint(
            http.clone(),
            server.url("/token"),
            "api://preservation/.default",
            ClientCredentials {
                client_id: id.to_string(),
                client_secret: "secret".to_string(),
            },
        ))
    };
    let api = ApiContext::from_parts(http.clone(), identity("primary"), config.api.clone());
    let secondary = ApiContext::from_parts(http.clone(), identity("secondary"), config.api.clone());
    let s3 = S3Transfer::new(Arc::new(InMemoryStoreProvider::new()));

    ScenarioContext::from_parts(config, api, Some(secondary), s3, driver)
}

#[derive(Debug, Clone)]
pub struct MetsFile {
    pub content_type: String,
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDeposit {
    pub locked_by: Option<String>,
    pub submission_text: Option<String>,
    pub directories: BTreeSet<String>,
    pub files: BTreeMap<String, MetsFile>,
    pub etag: u32,
}

impl FakeDeposit {
    fn etag(&self) -> String {
        format!("\"v{}\"", self.etag)
    }

    fn json(&self, base: &str, id: &str) -> Value {
        json!({
            "@id": format!("{}/deposits/{}", base, id),
            "files": format!("s3://working/deposits/{}/", id),
            "status": "new",
            "active": true,
            "submissionText": self.submission_text,
            "lockedBy": self.locked_by,
        })
    }

    /// Every directory, including ancestors of recorded files
    fn all_directories(&self) -> BTreeSet<String> {
        let mut dirs = self.directories.clone();
        for path in self.directories.iter().chain(self.files.keys()) {
            let parts: Vec<&str> = path.split('/').collect();
            for depth in 1..parts.len() {
                dirs.insert(parts[..depth].join("/"));
            }
        }
        dirs
    }

    fn mets(&self) -> String {
        let dirs = self.all_directories();
        let mut xml = String::from(
            r#"<mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:premis="http://www.loc.gov/premis/v3" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
        );
        for dir in &dirs {
            xml.push_str(&format!(
                r#"<mets:amdSec ID="{}"><mets:techMD><mets:mdWrap><mets:xmlData><premis:object><premis:originalName>{}</premis:originalName></premis:object></mets:xmlData></mets:mdWrap></mets:techMD></mets:amdSec>"#,
                admin_id(dir),
                dir
            ));
        }
        for (path, file) in &self.files {
            let fixity = file
                .digest
                .as_ref()
                .map(|d| {
                    format!(
                        "<premis:objectCharacteristics><premis:fixity><premis:messageDigestAlgorithm>SHA256</premis:messageDigestAlgorithm><premis:messageDigest>{}</premis:messageDigest></premis:fixity></premis:objectCharacteristics>",
                        d
                    )
                })
                .unwrap_or_default();
            xml.push_str(&format!(
                r#"<mets:amdSec ID="{}"><mets:techMD><mets:mdWrap><mets:xmlData><premis:object>{}<premis:originalName>{}</premis:originalName></premis:object></mets:xmlData></mets:mdWrap></mets:techMD></mets:amdSec>"#,
                admin_id(path),
                fixity,
                path
            ));
        }

        xml.push_str(r#"<mets:fileSec><mets:fileGrp USE="OBJECTS">"#);
        for (path, file) in &self.files {
            xml.push_str(&format!(
                r#"<mets:file ID="{}" ADMID="{}" MIMETYPE="{}"><mets:FLocat LOCTYPE="URL" xlink:href="{}"/></mets:file>"#,
                file_id(path),
                admin_id(path),
                file.content_type,
                path
            ));
        }
        xml.push_str("</mets:fileGrp></mets:fileSec>");

        xml.push_str(r#"<mets:structMap TYPE="PHYSICAL"><mets:div LABEL="__ROOT">"#);
        self.render_children("", &dirs, &mut xml);
        xml.push_str("</mets:div></mets:structMap></mets:mets>");
        xml
    }

    fn render_children(&self, parent: &str, dirs: &BTreeSet<String>, xml: &mut String) {
        for dir in dirs.iter().filter(|d| parent_of(d) == parent) {
            xml.push_str(&format!(r#"<mets:div LABEL="{}" ADMID="{}">"#, leaf(dir), admin_id(dir)));
            self.render_children(dir, dirs, xml);
            xml.push_str("</mets:div>");
        }
        for path in self.files.keys().filter(|p| parent_of(p) == parent) {
            xml.push_str(&format!(
                r#"<mets:div LABEL="{}" ADMID="{}"><mets:fptr FILEID="{}"/></mets:div>"#,
                leaf(path),
                admin_id(path),
                file_id(path)
            ));
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub containers: BTreeSet<String>,
    pub deposits: BTreeMap<String, FakeDeposit>,
    /// `<identity> <METHOD> <path>` per API request, and `ui <action>` per
    /// UI script that changed something
    pub log: Vec<String>,
    next_deposit: u32,
    /// Plain lock requests from this identity report success without
    /// taking a lock held by someone else
    misreport_lock_for: Option<String>,
}

/// In-process deposit service: repository containers, deposits with locks
/// and METS, and the UI screens the page objects drive
#[derive(Clone)]
pub struct FakeService {
    base_url: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeService {
    /// Serve every request on `server` that no earlier mock claimed
    pub async fn mount(server: &MockServer) -> Self {
        let service = Self {
            base_url: server.base_url(),
            state: Arc::new(Mutex::new(FakeState::default())),
        };
        let handler = service.clone();
        server
            .mock_async(move |_when, then| {
                then.respond_with(move |req: &HttpMockRequest| handler.handle(req));
            })
            .await;
        service
    }

    /// Drive `driver`'s scripts against this service's state
    pub fn attach_ui(&self, driver: &RecordingDriver) {
        let ui = self.clone();
        driver.respond_with(move |script| ui.run_script(script));
    }

    pub fn misreport_lock_for(&self, identity: &str) {
        self.state.lock().misreport_lock_for = Some(identity.to_string());
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Log lines mentioning `needle`
    pub fn requests_to(&self, needle: &str) -> Vec<String> {
        self.log().into_iter().filter(|l| l.contains(needle)).collect()
    }

    pub fn containers(&self) -> BTreeSet<String> {
        self.state.lock().containers.clone()
    }

    pub fn deposits(&self) -> BTreeMap<String, FakeDeposit> {
        self.state.lock().deposits.clone()
    }

    fn handle(&self, req: &HttpMockRequest) -> HttpMockResponse {
        let uri = req.uri();
        let path = uri.path().to_string();
        let force = uri.query().map_or(false, |q| q.contains("force=true"));
        let caller = caller(req);
        let method = req.method_str().to_string();

        let mut state = self.state.lock();
        let line = match uri.query() {
            Some(q) => format!("{} {} {}?{}", caller, method, path, q),
            None => format!("{} {} {}", caller, method, path),
        };
        state.log.push(line);

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method.as_str(), segments.as_slice()) {
            (_, ["repository", rest @ ..]) => self.repository(&mut state, &method, &rest.join("/")),
            ("POST", ["deposits"]) => {
                state.next_deposit += 1;
                let id = format!("d{}", state.next_deposit);
                let deposit = FakeDeposit {
                    submission_text: body_json(req).get("submissionText").and_then(Value::as_str).map(String::from),
                    ..Default::default()
                };
                let body = deposit.json(&self.base_url, &id);
                state.deposits.insert(id, deposit);
                json_response(201, &body)
            }
            (_, ["deposits", id, rest @ ..]) => self.deposit(&mut state, req, &caller, id, rest, force),
            _ => status(404),
        }
    }

    fn deposit(
        &self,
        state: &mut FakeState,
        req: &HttpMockRequest,
        caller: &str,
        id: &str,
        rest: &[&str],
        force: bool,
    ) -> HttpMockResponse {
        let method = req.method_str();
        let misreport = state.misreport_lock_for.as_deref() == Some(caller);
        let Some(deposit) = state.deposits.get_mut(id) else {
            return status(404);
        };
        let held_by_other = deposit.locked_by.as_deref().map_or(false, |holder| holder != caller);

        match (method, rest) {
            ("GET", []) => json_response(200, &deposit.json(&self.base_url, id)),
            ("PATCH", []) => {
                if let Some(text) = body_json(req).get("submissionText").and_then(Value::as_str) {
                    deposit.submission_text = Some(text.to_string());
                }
                json_response(200, &deposit.json(&self.base_url, id))
            }
            ("DELETE", []) if held_by_other => status(409),
            ("DELETE", []) => {
                state.deposits.remove(id);
                status(204)
            }
            ("POST", ["lock"]) if held_by_other && !force && misreport => status(204),
            ("POST", ["lock"]) if held_by_other && !force => status(409),
            ("POST", ["lock"]) => {
                deposit.locked_by = Some(caller.to_string());
                status(204)
            }
            ("DELETE", ["lock"]) if held_by_other => status(409),
            ("DELETE", ["lock"]) => {
                deposit.locked_by = None;
                status(204)
            }
            ("GET", ["mets"]) => HttpMockResponse::builder()
                .status(200)
                .header("content-type", "application/xml")
                .header("etag", deposit.etag())
                .body(deposit.mets())
                .build(),
            ("POST", ["mets"]) => {
                if header(req, "if-match").as_deref() != Some(deposit.etag().as_str()) {
                    return status(412);
                }
                let items = body_json(req);
                for item in items.as_array().into_iter().flatten() {
                    let Some(local_path) = item.get("localPath").and_then(Value::as_str) else {
                        continue;
                    };
                    match item.get("contentType").and_then(Value::as_str) {
                        Some(content_type) => {
                            let file = MetsFile {
                                content_type: content_type.to_string(),
                                digest: item.get("digest").and_then(Value::as_str).map(String::from),
                            };
                            deposit.files.insert(local_path.to_string(), file);
                        }
                        None => {
                            deposit.directories.insert(local_path.to_string());
                        }
                    }
                }
                deposit.etag += 1;
                status(204)
            }
            _ => status(404),
        }
    }

    fn repository(&self, state: &mut FakeState, method: &str, path: &str) -> HttpMockResponse {
        match method {
            "GET" if state.containers.contains(path) => json_response(200, &self.container_json(state, path)),
            "PUT" if state.containers.contains(path) => status(409),
            "PUT" => {
                state.containers.insert(path.to_string());
                json_response(201, &self.container_json(state, path))
            }
            "DELETE" if state.containers.remove(path) => status(204),
            _ => status(404),
        }
    }

    fn container_json(&self, state: &FakeState, path: &str) -> Value {
        let children: Vec<Value> = state
            .containers
            .iter()
            .filter(|c| parent_of(c) == path)
            .map(|c| json!({ "@id": format!("{}/repository/{}", self.base_url, c), "type": "Container", "name": leaf(c) }))
            .collect();
        json!({
            "@id": format!("{}/repository/{}", self.base_url, path),
            "type": "Container",
            "name": leaf(path),
            "containers": children,
            "binaries": [],
            "created": TIMESTAMP,
            "lastModified": TIMESTAMP,
        })
    }

    /// The UI's side of a script; `None` leaves it to the driver's queue
    fn run_script(&self, script: &Script) -> Option<Reply> {
        let path = goto(script)?;
        let mut state = self.state.lock();
        let mut values = BTreeMap::new();

        if path == "/search" {
            let query = filled(script, &Locator::any(Role::Searchbox))?;
            let rows: Vec<String> = state
                .containers
                .iter()
                .filter(|c| c.contains(query))
                .map(|c| format!("{} Container", leaf(c)))
                .collect();
            values.insert("rows".to_string(), serde_json::to_string(&rows).ok()?);
        } else if let Some(browsed) = path.strip_prefix("/browse/") {
            if clicks(script, &Locator::role(Role::Button, "Create container").exact()) {
                let slug = filled(script, &Locator::label("Container name"))?;
                let child = format!("{}/{}", browsed, slug);
                state.log.push(format!("ui create container {}", child));
                state.containers.insert(child);
            } else if clicks(script, &Locator::role(Role::Button, "Delete container")) {
                state.log.push(format!("ui delete container {}", browsed));
                state.containers.remove(browsed);
            }
        } else if let Some(id) = path.strip_prefix("/deposits/") {
            let page = DepositPage::new(id);
            let deposit = state.deposits.get_mut(id)?;
            let mut action = None;

            if clicks(script, &Locator::role(Role::Button, "Create new folder").exact()) {
                let parent = filled(script, &Locator::label("Parent folder"))?;
                let name = filled(script, &Locator::label("Folder name"))?;
                let folder = format!("{}/{}", parent, name);
                action = Some(format!("ui create folder {}", folder));
                deposit.directories.insert(folder);
                deposit.etag += 1;
            } else if clicks(script, &Locator::role(Role::Button, "Delete item").exact()) {
                let target = deposit
                    .files
                    .keys()
                    .find(|p| script.steps.contains(&Interaction::ExpectHidden { target: page.item_row(p) }))
                    .cloned()?;
                let from_mets = script.steps.contains(&Interaction::Check {
                    target: Locator::label("Also delete from METS"),
                });
                if from_mets {
                    deposit.files.remove(&target);
                    deposit.etag += 1;
                }
                action = Some(format!("ui delete {} (from METS: {})", target, from_mets));
            } else if reads(script, "items") {
                let names: Vec<String> = deposit
                    .all_directories()
                    .iter()
                    .chain(deposit.files.keys())
                    .map(|p| leaf(p).to_string())
                    .collect();
                values.insert("items".to_string(), serde_json::to_string(&names).ok()?);
            }
            if let Some(action) = action {
                state.log.push(action);
            }
        } else {
            return None;
        }
        Some(Reply::Values(values))
    }
}

fn caller(req: &HttpMockRequest) -> String {
    header(req, "authorization")
        .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.trim_end_matches("-token").to_string()))
        .unwrap_or_else(|| "anonymous".to_string())
}

fn header(req: &HttpMockRequest, name: &str) -> Option<String> {
    req.headers_vec()
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

fn body_json(req: &HttpMockRequest) -> Value {
    serde_json::from_slice(req.body_ref()).unwrap_or(Value::Null)
}

fn status(code: u16) -> HttpMockResponse {
    HttpMockResponse::builder().status(code).build()
}

fn json_response(code: u16, body: &Value) -> HttpMockResponse {
    HttpMockResponse::builder()
        .status(code)
        .header("content-type", "application/json")
        .body(body.to_string())
        .build()
}

fn goto(script: &Script) -> Option<&str> {
    script.steps.iter().find_map(|s| match s {
        Interaction::Goto { path } => Some(path.as_str()),
        _ => None,
    })
}

fn filled<'a>(script: &'a Script, target: &Locator) -> Option<&'a str> {
    script.steps.iter().find_map(|s| match s {
        Interaction::Fill { target: t, value } if t == target => Some(value.as_str()),
        _ => None,
    })
}

fn clicks(script: &Script, target: &Locator) -> bool {
    script.steps.contains(&Interaction::Click { target: target.clone() })
}

fn reads(script: &Script, key: &str) -> bool {
    script
        .steps
        .iter()
        .any(|s| matches!(s, Interaction::ReadAllText { key: k, .. } if k == key))
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn admin_id(path: &str) -> String {
    format!("ADM_{}", path.replace('/', "_"))
}

fn file_id(path: &str) -> String {
    format!("FILE_{}", path.replace('/', "_"))
}
