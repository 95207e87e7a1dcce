//! In-memory fake of the remote storage and automation service.
//!
//! Implements `Transport` by routing on the request path, holding all
//! service state (buckets, objects, signed URLs, packages, activities,
//! aliases, work items) behind a mutex. Work-item status sequences are
//! scripted per submission, and signed URLs enforce their single-use
//! contract so the client's behavior against a consumed URL can be
//! observed. Provisioning mutations are counted so tests can assert
//! that a second reconciliation run changes nothing.

use crate::transport::{ApiRequest, ApiResponse, Body, Method, Transport};
use async_trait::async_trait;
use da_core::{Credentials, Error, WorkItemStatus};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

const ACCEPTED_CLIENT_ID: &str = "test-client";
const ACCEPTED_CLIENT_SECRET: &str = "test-secret";

/// One scripted step of a work item's poll sequence.
#[derive(Clone, Debug)]
pub enum PollStep {
    Status(WorkItemStatus),
    /// The next status poll fails at the network level.
    TransportFailure,
}

#[derive(Clone, Debug)]
struct Script {
    steps: Vec<PollStep>,
    with_report: bool,
}

#[derive(Default)]
struct BucketState {
    objects: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
struct ResourceState {
    version: u64,
    aliases: BTreeMap<String, u64>,
    /// Create/version request bodies, newest last.
    definitions: Vec<Value>,
    /// Uploaded archive bytes per version (packages only).
    archives: BTreeMap<u64, Vec<u8>>,
}

struct SignedUrlState {
    bucket: String,
    object: String,
    consumed: bool,
}

struct PendingUpload {
    package_id: String,
    version: u64,
    consumed: bool,
}

struct WorkItemState {
    steps: VecDeque<PollStep>,
    report_url: Option<String>,
    polls: u64,
    /// Direct bucket-object write targets parsed from the submission,
    /// materialized when the item first reports success.
    outputs: Vec<(String, String)>,
    outputs_written: bool,
}

#[derive(Default)]
struct ServiceState {
    issued_tokens: BTreeSet<String>,
    buckets: BTreeMap<String, BucketState>,
    foreign_buckets: BTreeSet<String>,
    signed_urls: BTreeMap<String, SignedUrlState>,
    packages: BTreeMap<String, ResourceState>,
    activities: BTreeMap<String, ResourceState>,
    pending_uploads: BTreeMap<String, PendingUpload>,
    work_items: BTreeMap<String, WorkItemState>,
    scripts: VecDeque<Script>,
    submissions: Vec<Value>,
    mutations: u64,
}

pub struct MemoryTransport {
    nickname: String,
    state: Mutex<ServiceState>,
}

impl MemoryTransport {
    pub fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// The credentials this fake accepts on `/authenticate`.
    pub fn credentials() -> Credentials {
        Credentials {
            client_id: ACCEPTED_CLIENT_ID.to_string(),
            client_secret: ACCEPTED_CLIENT_SECRET.to_string(),
        }
    }

    /// Scripts the poll sequence of the next submitted work item.
    /// Submissions without a script run `pending, success`.
    pub fn script_work_item(&self, steps: Vec<PollStep>, with_report: bool) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push_back(Script { steps, with_report });
    }

    /// Marks a bucket key as owned by another principal: detail lookups
    /// on it answer 403.
    pub fn seed_foreign_bucket(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .foreign_buckets
            .insert(key.to_string());
    }

    pub fn mutation_count(&self) -> u64 {
        self.state.lock().unwrap().mutations
    }

    pub fn bucket_exists(&self, key: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(key)
    }

    pub fn object_bytes(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(name).cloned())
    }

    pub fn package_version(&self, id: &str) -> Option<u64> {
        self.state.lock().unwrap().packages.get(id).map(|p| p.version)
    }

    pub fn package_alias(&self, id: &str, alias: &str) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .packages
            .get(id)
            .and_then(|p| p.aliases.get(alias).copied())
    }

    pub fn package_archive(&self, id: &str, version: u64) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .packages
            .get(id)
            .and_then(|p| p.archives.get(&version).cloned())
    }

    pub fn activity_version(&self, id: &str) -> Option<u64> {
        self.state.lock().unwrap().activities.get(id).map(|a| a.version)
    }

    pub fn activity_alias(&self, id: &str, alias: &str) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .activities
            .get(id)
            .and_then(|a| a.aliases.get(alias).copied())
    }

    /// Body of the most recent create/version call for an activity.
    pub fn latest_activity_definition(&self, id: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .activities
            .get(id)
            .and_then(|a| a.definitions.last().cloned())
    }

    pub fn work_item_polls(&self, id: &str) -> u64 {
        self.state
            .lock()
            .unwrap()
            .work_items
            .get(id)
            .map(|w| w.polls)
            .unwrap_or(0)
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submissions.len()
    }

    pub fn last_submission(&self) -> Option<Value> {
        self.state.lock().unwrap().submissions.last().cloned()
    }

    fn authorized(&self, state: &ServiceState, request: &ApiRequest) -> bool {
        let Some(headers) = &request.headers else {
            return false;
        };
        headers
            .get("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| state.issued_tokens.contains(token))
            .unwrap_or(false)
    }
}

fn resp(status: u16, body: Value) -> Result<ApiResponse, Error> {
    Ok(ApiResponse {
        status,
        body: serde_json::to_vec(&body).unwrap_or_default(),
    })
}

fn resp_bytes(status: u16, body: Vec<u8>) -> Result<ApiResponse, Error> {
    Ok(ApiResponse { status, body })
}

fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    match rest.find('/') {
        Some(i) => &rest[i..],
        None => "/",
    }
}

fn json_body(body: &Body) -> Value {
    match body {
        Body::Json(v) => v.clone(),
        _ => Value::Null,
    }
}

fn form_field<'a>(body: &'a Body, key: &str) -> Option<&'a str> {
    match body {
        Body::Form(fields) => fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str()),
        _ => None,
    }
}

/// (bucket, object) from a direct object URL, if it is one.
fn bucket_object_of(url: &str) -> Option<(String, String)> {
    let path = path_of(url);
    let mut parts = path.trim_start_matches('/').split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("buckets"), Some(bucket), Some("objects"), Some(object)) => {
            Some((bucket.to_string(), object.to_string()))
        }
        _ => None,
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let mut state = self.state.lock().unwrap();
        let path = path_of(&request.url).to_string();
        let segments: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .map(|s| s.to_string())
            .collect();
        let segs: Vec<&str> = segments.iter().map(|s| s.as_str()).collect();

        // Capability URLs and the token grant carry no bearer.
        match (request.method, segs.as_slice()) {
            (Method::Post, ["authenticate"]) => {
                let id = form_field(&request.body, "client_id").unwrap_or_default();
                let secret = form_field(&request.body, "client_secret").unwrap_or_default();
                if id != ACCEPTED_CLIENT_ID || secret != ACCEPTED_CLIENT_SECRET {
                    return resp(401, json!({ "developerMessage": "invalid client credentials" }));
                }
                let token = format!("tok-{}", Uuid::new_v4());
                state.issued_tokens.insert(token.clone());
                return resp(200, json!({ "access_token": token, "token_type": "Bearer" }));
            }
            (method, ["signed", token]) => {
                let token = token.to_string();
                let Some(signed) = state.signed_urls.get(&token) else {
                    return resp(404, json!({ "reason": "unknown signed url" }));
                };
                if signed.consumed {
                    return resp(403, json!({ "reason": "signed url already consumed" }));
                }
                let (bucket, object) = (signed.bucket.clone(), signed.object.clone());
                match method {
                    Method::Get => {
                        let Some(bytes) = state
                            .buckets
                            .get(&bucket)
                            .and_then(|b| b.objects.get(&object).cloned())
                        else {
                            return resp(404, json!({ "reason": "object not found" }));
                        };
                        state.signed_urls.get_mut(&token).unwrap().consumed = true;
                        return resp_bytes(200, bytes);
                    }
                    Method::Put => {
                        let Body::Bytes(bytes) = &request.body else {
                            return resp(400, json!({ "reason": "expected raw bytes" }));
                        };
                        let bytes = bytes.clone();
                        state
                            .buckets
                            .entry(bucket)
                            .or_default()
                            .objects
                            .insert(object, bytes);
                        state.signed_urls.get_mut(&token).unwrap().consumed = true;
                        return resp(200, json!({}));
                    }
                    _ => return resp(405, json!({ "reason": "unsupported verb" })),
                }
            }
            (Method::Post, ["uploads", token]) => {
                let token = token.to_string();
                let Some(upload) = state.pending_uploads.get(&token) else {
                    return resp(404, json!({ "reason": "unknown upload target" }));
                };
                if upload.consumed {
                    return resp(403, json!({ "reason": "upload target already consumed" }));
                }
                let Body::Multipart { file, .. } = &request.body else {
                    return resp(400, json!({ "reason": "expected multipart form" }));
                };
                let file = file.clone();
                let (package_id, version) = (upload.package_id.clone(), upload.version);
                state.pending_uploads.get_mut(&token).unwrap().consumed = true;
                state.mutations += 1;
                state
                    .packages
                    .entry(package_id)
                    .or_default()
                    .archives
                    .insert(version, file);
                return resp(200, json!({}));
            }
            (Method::Get, ["reports", ..]) => {
                return resp_bytes(200, b"work item report log".to_vec());
            }
            _ => {}
        }

        if !self.authorized(&state, &request) {
            return resp(401, json!({ "reason": "missing or unknown bearer token" }));
        }

        match (request.method, segs.as_slice()) {
            // ---- storage ----
            (Method::Get, ["buckets", key, "details"]) => {
                if state.foreign_buckets.contains(*key) {
                    resp(403, json!({ "reason": "bucket owned by another application" }))
                } else if state.buckets.contains_key(*key) {
                    resp(200, json!({ "bucketKey": key }))
                } else {
                    resp(404, json!({ "reason": "bucket not found" }))
                }
            }
            (Method::Post, ["buckets"]) => {
                let body = json_body(&request.body);
                let Some(key) = body["bucketKey"].as_str().map(|s| s.to_string()) else {
                    return resp(400, json!({ "reason": "bucketKey required" }));
                };
                if state.buckets.contains_key(&key) || state.foreign_buckets.contains(&key) {
                    return resp(409, json!({ "reason": "bucket already exists" }));
                }
                state.mutations += 1;
                state.buckets.insert(key.clone(), BucketState::default());
                resp(200, json!({ "bucketKey": key }))
            }
            (Method::Get, ["buckets", bucket, "objects", object, "details"]) => {
                if state.foreign_buckets.contains(*bucket) {
                    return resp(403, json!({ "reason": "bucket owned by another application" }));
                }
                let present = state
                    .buckets
                    .get(*bucket)
                    .map(|b| b.objects.contains_key(*object))
                    .unwrap_or(false);
                if present {
                    resp(200, json!({ "objectKey": object }))
                } else {
                    resp(404, json!({ "reason": "object not found" }))
                }
            }
            (Method::Put, ["buckets", bucket, "objects", object]) => {
                let Body::Bytes(bytes) = &request.body else {
                    return resp(400, json!({ "reason": "expected raw bytes" }));
                };
                if !state.buckets.contains_key(*bucket) {
                    return resp(404, json!({ "reason": "bucket not found" }));
                }
                let bytes = bytes.clone();
                let (bucket, object) = (bucket.to_string(), object.to_string());
                state.mutations += 1;
                state
                    .buckets
                    .get_mut(&bucket)
                    .unwrap()
                    .objects
                    .insert(object.clone(), bytes);
                resp(200, json!({ "objectKey": object }))
            }
            (Method::Post, ["buckets", bucket, "objects", object, "signed"]) => {
                let token = Uuid::new_v4().to_string();
                let url = format!("http://storage.test/signed/{token}");
                state.signed_urls.insert(
                    token,
                    SignedUrlState {
                        bucket: bucket.to_string(),
                        object: object.to_string(),
                        consumed: false,
                    },
                );
                resp(200, json!({ "signedUrl": url }))
            }

            // ---- account ----
            (Method::Get, ["forgeapps", "me"]) => {
                resp(200, Value::String(self.nickname.clone()))
            }

            // ---- packages / activities ----
            (Method::Get, ["appbundles"]) => {
                let names = listing(&state.packages, &self.nickname);
                resp(200, json!({ "data": names }))
            }
            (Method::Get, ["activities"]) => {
                let names = listing(&state.activities, &self.nickname);
                resp(200, json!({ "data": names }))
            }
            (Method::Post, ["appbundles"]) => {
                let body = json_body(&request.body);
                let Some(id) = body["id"].as_str().map(|s| s.to_string()) else {
                    return resp(400, json!({ "reason": "id required" }));
                };
                if state.packages.contains_key(&id) {
                    return resp(409, json!({ "reason": "appbundle already exists" }));
                }
                state.mutations += 1;
                let resource = state.packages.entry(id.clone()).or_default();
                resource.version = 1;
                resource.definitions.push(body);
                let upload = new_upload(&mut state, &id, 1);
                resp(200, json!({ "version": 1, "uploadParameters": upload }))
            }
            (Method::Post, ["appbundles", id, "versions"]) => {
                let id = id.to_string();
                let body = json_body(&request.body);
                if !state.packages.contains_key(&id) {
                    return resp(404, json!({ "reason": "appbundle not found" }));
                }
                state.mutations += 1;
                let resource = state.packages.get_mut(&id).unwrap();
                resource.version += 1;
                resource.definitions.push(body);
                let version = resource.version;
                let upload = new_upload(&mut state, &id, version);
                resp(200, json!({ "version": version, "uploadParameters": upload }))
            }
            (Method::Post, ["activities"]) => {
                let body = json_body(&request.body);
                let Some(id) = body["id"].as_str().map(|s| s.to_string()) else {
                    return resp(400, json!({ "reason": "id required" }));
                };
                if state.activities.contains_key(&id) {
                    return resp(409, json!({ "reason": "activity already exists" }));
                }
                state.mutations += 1;
                let resource = state.activities.entry(id).or_default();
                resource.version = 1;
                resource.definitions.push(body);
                resp(200, json!({ "version": 1 }))
            }
            (Method::Post, ["activities", id, "versions"]) => {
                let body = json_body(&request.body);
                let Some(resource) = state.activities.get_mut(*id) else {
                    return resp(404, json!({ "reason": "activity not found" }));
                };
                resource.version += 1;
                resource.definitions.push(body);
                let version = resource.version;
                state.mutations += 1;
                resp(200, json!({ "version": version }))
            }
            (Method::Get, [kind @ ("appbundles" | "activities"), id, "aliases", alias]) => {
                let map = resources_of(&state, *kind);
                match map.get(*id).and_then(|r| r.aliases.get(*alias)) {
                    Some(version) => resp(200, json!({ "id": alias, "version": version })),
                    None => resp(404, json!({ "reason": "alias not found" })),
                }
            }
            (Method::Post, [kind @ ("appbundles" | "activities"), id, "aliases"]) => {
                let body = json_body(&request.body);
                let Some(alias) = body["id"].as_str().map(|s| s.to_string()) else {
                    return resp(400, json!({ "reason": "alias id required" }));
                };
                let Some(version) = body["version"].as_u64() else {
                    return resp(400, json!({ "reason": "version required" }));
                };
                let id = id.to_string();
                let kind = kind.to_string();
                let Some(resource) = resources_of_mut(&mut state, &kind).get_mut(&id) else {
                    return resp(404, json!({ "reason": "resource not found" }));
                };
                if resource.aliases.contains_key(&alias) {
                    return resp(409, json!({ "reason": "alias already exists" }));
                }
                resource.aliases.insert(alias.clone(), version);
                state.mutations += 1;
                resp(200, json!({ "id": alias, "version": version }))
            }
            (Method::Patch, [kind @ ("appbundles" | "activities"), id, "aliases", alias]) => {
                let body = json_body(&request.body);
                let Some(version) = body["version"].as_u64() else {
                    return resp(400, json!({ "reason": "version required" }));
                };
                let (id, alias, kind) = (id.to_string(), alias.to_string(), kind.to_string());
                let Some(resource) = resources_of_mut(&mut state, &kind).get_mut(&id) else {
                    return resp(404, json!({ "reason": "resource not found" }));
                };
                if !resource.aliases.contains_key(&alias) {
                    return resp(404, json!({ "reason": "alias not found" }));
                }
                resource.aliases.insert(alias, version);
                state.mutations += 1;
                resp(200, json!({ "version": version }))
            }

            // ---- work items ----
            (Method::Post, ["workitems"]) => {
                let body = json_body(&request.body);
                let id = format!("wi-{}", Uuid::new_v4());
                let script = state.scripts.pop_front().unwrap_or(Script {
                    steps: vec![
                        PollStep::Status(WorkItemStatus::Pending),
                        PollStep::Status(WorkItemStatus::Success),
                    ],
                    with_report: true,
                });
                let report_url = script
                    .with_report
                    .then(|| format!("http://engine.test/reports/{id}"));
                let outputs = output_targets(&body);
                state.submissions.push(body);
                state.work_items.insert(
                    id.clone(),
                    WorkItemState {
                        steps: script.steps.into(),
                        report_url,
                        polls: 0,
                        outputs,
                        outputs_written: false,
                    },
                );
                resp(200, json!({ "id": id, "status": "pending" }))
            }
            (Method::Get, ["workitems", id]) => {
                let id = id.to_string();
                let Some(item) = state.work_items.get_mut(&id) else {
                    return resp(404, json!({ "reason": "work item not found" }));
                };
                item.polls += 1;
                let step = if item.steps.len() > 1 {
                    item.steps.pop_front().unwrap()
                } else {
                    item.steps
                        .front()
                        .cloned()
                        .unwrap_or(PollStep::Status(WorkItemStatus::Success))
                };
                match step {
                    PollStep::TransportFailure => {
                        Err(Error::transport(None, "injected network failure"))
                    }
                    PollStep::Status(status) => {
                        let report_url = item.report_url.clone();
                        let pending_outputs = (status == WorkItemStatus::Success
                            && !item.outputs_written)
                            .then(|| item.outputs.clone());
                        if pending_outputs.is_some() {
                            item.outputs_written = true;
                        }
                        if let Some(outputs) = pending_outputs {
                            for (bucket, object) in outputs {
                                state
                                    .buckets
                                    .entry(bucket)
                                    .or_default()
                                    .objects
                                    .insert(object, b"engine output".to_vec());
                            }
                        }
                        let mut body = json!({ "id": id, "status": status });
                        if status.is_terminal() {
                            if let Some(url) = report_url {
                                body["reportUrl"] = json!(url);
                            }
                        }
                        resp(200, body)
                    }
                }
            }

            _ => resp(404, json!({ "reason": format!("no route for {path}") })),
        }
    }
}

fn listing(resources: &BTreeMap<String, ResourceState>, nickname: &str) -> Vec<String> {
    let mut names = Vec::new();
    for (id, resource) in resources {
        for alias in resource.aliases.keys() {
            names.push(da_core::qualified_name(nickname, id, alias));
        }
    }
    names
}

fn resources_of<'a>(
    state: &'a ServiceState,
    kind: &str,
) -> &'a BTreeMap<String, ResourceState> {
    if kind == "appbundles" {
        &state.packages
    } else {
        &state.activities
    }
}

fn resources_of_mut<'a>(
    state: &'a mut ServiceState,
    kind: &str,
) -> &'a mut BTreeMap<String, ResourceState> {
    if kind == "appbundles" {
        &mut state.packages
    } else {
        &mut state.activities
    }
}

fn new_upload(state: &mut ServiceState, package_id: &str, version: u64) -> Value {
    let token = Uuid::new_v4().to_string();
    let url = format!("http://engine.test/uploads/{token}");
    state.pending_uploads.insert(
        token.clone(),
        PendingUpload {
            package_id: package_id.to_string(),
            version,
            consumed: false,
        },
    );
    json!({
        "endpointURL": url,
        "formData": { "key": format!("apps/{package_id}/{version}"), "policy": token },
    })
}

/// Direct bucket-object URLs the engine would write on success.
fn output_targets(submission: &Value) -> Vec<(String, String)> {
    let mut targets = Vec::new();
    if let Some(args) = submission["arguments"].as_object() {
        for arg in args.values() {
            let is_write = arg["verb"]
                .as_str()
                .map(|v| v == "put" || v == "post")
                .unwrap_or(false);
            if !is_write {
                continue;
            }
            if let Some(url) = arg["url"].as_str() {
                if let Some(target) = bucket_object_of(url) {
                    targets.push(target);
                }
            }
        }
    }
    targets
}
