// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory Kubernetes API server behind a real `kube::Client`.

use crate::constants::labels;
use crate::kubernetes::retry::RetryPolicy;
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

#[derive(Default)]
struct State {
    /// Objects keyed by their full API path
    objects: BTreeMap<String, Value>,
    resource_version: u64,
    /// Injected failures: (method, path prefix) -> (status, remaining)
    failures: HashMap<(String, String), (u16, u32)>,
    requests: Vec<(String, String)>,
}

/// A fake API server storing objects in memory.
///
/// Supports create, get, list with equality label selectors, JSON merge patch, replace, delete
/// and merge patches of the status subresource. Replaces and patches carrying a stale
/// resourceVersion are rejected with 409.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a kube Client backed by this server
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// Store an object as if it had been created through the API
    pub fn seed<K>(&self, object: &K) -> &Self
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let meta = object.meta();
        let path = format!(
            "{}/{}",
            K::url_path(&(), meta.namespace.as_deref()),
            meta.name.clone().unwrap_or_default()
        );
        let value = serde_json::to_value(object).expect("serializable object");
        let mut state = self.state.lock().unwrap();
        let stored = stamp(&mut state, value, meta.namespace.as_deref());
        state.objects.insert(path, stored);
        self
    }

    /// Fetch a stored object
    pub fn get<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let path = format!("{}/{}", K::url_path(&(), Some(namespace)), name);
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&path)
            .map(|v| serde_json::from_value(v.clone()).expect("stored object deserializes"))
    }

    /// Number of stored objects of a kind in a namespace
    pub fn count<K>(&self, namespace: &str) -> usize
    where
        K: Resource<DynamicType = ()>,
    {
        let prefix = format!("{}/", K::url_path(&(), Some(namespace)));
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|k| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .count()
    }

    /// Fail the next `times` requests matching method and path prefix with `status`
    pub fn fail(&self, method: &str, path_prefix: &str, status: u16, times: u32) -> &Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((method.to_string(), path_prefix.to_string()), (status, times));
        self
    }

    /// Number of requests seen matching method and path prefix
    pub fn requests_to(&self, method: &str, path_prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(m, p)| m == method && p.starts_with(path_prefix))
            .count()
    }

    fn handle(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.to_string(), path.to_string()));

        let injected = state
            .failures
            .iter_mut()
            .find(|((m, p), (_, remaining))| {
                m == method && path.starts_with(p.as_str()) && *remaining > 0
            })
            .map(|(_, (status, remaining))| {
                *remaining -= 1;
                *status
            });
        if let Some(status) = injected {
            return (status, status_json(status, "Injected", "injected failure"));
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let collection_len = if segments.first() == Some(&"api") { 5 } else { 6 };
        let namespace = segments.get(collection_len - 2).map(|s| s.to_string());

        if segments.len() == collection_len {
            match method {
                "GET" => (200, list(&state, path, query)),
                "POST" => {
                    let body = body.unwrap_or(Value::Null);
                    create(&mut state, path, namespace.as_deref(), body)
                }
                _ => (405, status_json(405, "MethodNotAllowed", method)),
            }
        } else if segments.len() == collection_len + 1 {
            match method {
                "GET" => match state.objects.get(path) {
                    Some(obj) => (200, obj.clone()),
                    None => (404, status_json(404, "NotFound", path)),
                },
                "PUT" => replace(&mut state, path, body.unwrap_or(Value::Null)),
                "PATCH" => patch(&mut state, path, &body.unwrap_or(Value::Null), false),
                "DELETE" => match state.objects.remove(path) {
                    Some(obj) => (200, obj),
                    None => (404, status_json(404, "NotFound", path)),
                },
                _ => (405, status_json(405, "MethodNotAllowed", method)),
            }
        } else if segments.len() == collection_len + 2 && segments.last() == Some(&"status") {
            let object_path = path.trim_end_matches("/status");
            match method {
                "PATCH" => patch(&mut state, object_path, &body.unwrap_or(Value::Null), true),
                "GET" => match state.objects.get(object_path) {
                    Some(obj) => (200, obj.clone()),
                    None => (404, status_json(404, "NotFound", path)),
                },
                _ => (405, status_json(405, "MethodNotAllowed", method)),
            }
        } else {
            (404, status_json(404, "NotFound", path))
        }
    }
}

fn stamp(state: &mut State, mut value: Value, namespace: Option<&str>) -> Value {
    state.resource_version += 1;
    let rv = state.resource_version;
    let meta = value
        .as_object_mut()
        .expect("object body")
        .entry("metadata")
        .or_insert_with(|| json!({}));
    meta["resourceVersion"] = json!(rv.to_string());
    meta["uid"] = json!(format!("uid-{}", rv));
    meta["generation"] = json!(1);
    if let Some(ns) = namespace {
        meta["namespace"] = json!(ns);
    }
    value
}

fn bump(state: &mut State, value: &mut Value, spec_changed: bool) {
    state.resource_version += 1;
    value["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());
    if spec_changed {
        let generation = value["metadata"]["generation"].as_i64().unwrap_or(1);
        value["metadata"]["generation"] = json!(generation + 1);
    }
}

fn list(state: &State, path: &str, query: Option<&str>) -> Value {
    let selector: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .filter(|(k, _)| k == "labelSelector")
                .flat_map(|(_, v)| {
                    v.split(',')
                        .filter_map(|term| term.split_once('='))
                        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                        .collect::<Vec<_>>()
                })
                .collect()
        })
        .unwrap_or_default();

    let prefix = format!("{}/", path);
    let items: Vec<Value> = state
        .objects
        .iter()
        .filter(|(k, _)| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
        .map(|(_, v)| v)
        .filter(|v| {
            selector.iter().all(|(k, want)| {
                v["metadata"]["labels"][k.as_str()].as_str() == Some(want.as_str())
            })
        })
        .cloned()
        .collect();

    json!({
        "apiVersion": "v1",
        "kind": "List",
        "metadata": {"resourceVersion": state.resource_version.to_string()},
        "items": items,
    })
}

fn create(state: &mut State, path: &str, namespace: Option<&str>, body: Value) -> (u16, Value) {
    let Some(name) = body["metadata"]["name"].as_str().map(String::from) else {
        return (422, status_json(422, "Invalid", "metadata.name is required"));
    };
    let object_path = format!("{}/{}", path, name);
    if state.objects.contains_key(&object_path) {
        return (409, status_json(409, "AlreadyExists", &name));
    }
    let stored = stamp(state, body, namespace);
    state.objects.insert(object_path, stored.clone());
    (201, stored)
}

fn replace(state: &mut State, path: &str, mut body: Value) -> (u16, Value) {
    let Some(current) = state.objects.get(path).cloned() else {
        return (404, status_json(404, "NotFound", path));
    };
    let current_rv = current["metadata"]["resourceVersion"].clone();
    let sent_rv = body["metadata"]["resourceVersion"].clone();
    if !sent_rv.is_null() && sent_rv != current_rv {
        return (409, status_json(409, "Conflict", "the object has been modified"));
    }
    for key in ["uid", "generation", "namespace"] {
        body["metadata"][key] = current["metadata"][key].clone();
    }
    let spec_changed = body["spec"] != current["spec"];
    bump(state, &mut body, spec_changed);
    state.objects.insert(path.to_string(), body.clone());
    (200, body)
}

fn patch(state: &mut State, path: &str, body: &Value, status_only: bool) -> (u16, Value) {
    let Some(mut current) = state.objects.get(path).cloned() else {
        return (404, status_json(404, "NotFound", path));
    };
    let sent_rv = &body["metadata"]["resourceVersion"];
    if !status_only && !sent_rv.is_null() && *sent_rv != current["metadata"]["resourceVersion"] {
        return (409, status_json(409, "Conflict", "the object has been modified"));
    }
    let before_spec = current["spec"].clone();
    if status_only {
        merge(&mut current["status"], &body["status"]);
    } else {
        merge(&mut current, body);
    }
    let spec_changed = current["spec"] != before_spec;
    bump(state, &mut current, spec_changed);
    state.objects.insert(path.to_string(), current.clone());
    (200, current)
}

/// RFC 7386 JSON merge patch
fn merge(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let object = target.as_object_mut().expect("object target");
            for (key, value) in fields {
                if value.is_null() {
                    object.remove(key);
                } else {
                    merge(object.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        Value::Null => {}
        other => *target = other.clone(),
    }
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.clone();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(String::from);

        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            let body = if bytes.is_empty() {
                None
            } else {
                Some(serde_json::from_slice::<Value>(&bytes)?)
            };

            let (status, payload) = server.handle(&method, &path, query.as_deref(), body);
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string().into_bytes()))?)
        })
    }
}

/// Create a Kubernetes Status JSON body
pub fn status_json(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
}

/// Retry policy with millisecond delays
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        multiplier: 2,
        max_delay: Duration::from_millis(4),
    }
}

fn proxy_meta(name: &str, namespace: &str, managed: bool) -> ObjectMeta {
    let labels = managed.then(|| {
        BTreeMap::from([(labels::PROXY.to_string(), "true".to_string())])
    });
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels,
        ..Default::default()
    }
}

fn proxy_template(name: &str) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "nginx".to_string(),
                image: Some("nginx:1.27".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

fn app_selector(name: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
        ..Default::default()
    }
}

/// An nginx Deployment, labeled as a managed proxy when `managed`
pub fn proxy_deployment(name: &str, namespace: &str, managed: bool) -> Deployment {
    Deployment {
        metadata: proxy_meta(name, namespace, managed),
        spec: Some(DeploymentSpec {
            selector: app_selector(name),
            template: proxy_template(name),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn proxy_statefulset(name: &str, namespace: &str, managed: bool) -> StatefulSet {
    StatefulSet {
        metadata: proxy_meta(name, namespace, managed),
        spec: Some(StatefulSetSpec {
            selector: app_selector(name),
            template: proxy_template(name),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn proxy_daemonset(name: &str, namespace: &str, managed: bool) -> DaemonSet {
    DaemonSet {
        metadata: proxy_meta(name, namespace, managed),
        spec: Some(DaemonSetSpec {
            selector: app_selector(name),
            template: proxy_template(name),
            ..Default::default()
        }),
        ..Default::default()
    }
}
