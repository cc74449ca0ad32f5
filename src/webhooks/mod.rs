use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::catalog::Catalog;
use crate::{Error, Metrics, Result};

pub mod controllerregistration;
pub mod shoot;

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
        }
    }
}

/// State shared between the webhooks and the web server
#[derive(Clone)]
pub struct State {
    /// Diagnostics populated by the webhooks
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    pub registry: prometheus::Registry,
    metrics: Metrics,
    /// Listers for the objects referenced during admission
    pub catalog: Catalog,
}

impl State {
    pub fn new(catalog: Catalog) -> Result<Self, prometheus::Error> {
        let registry = prometheus::Registry::default();
        let metrics = Metrics::default().register(&registry)?;
        Ok(Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            registry,
            metrics,
            catalog,
        })
    }

    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.catalog.readiness.is_ready()
    }

    async fn record_event(&self) {
        self.diagnostics.write().await.last_event = Utc::now();
    }
}

pub(crate) fn operation_label(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Re-decode the untyped admission object as `K`.
pub(crate) fn decode<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Carries the change from `before` to `after` over into `raw`.
///
/// `before` and `after` are typed renderings of the object `raw` was decoded from. Fields they
/// leave unchanged keep their submitted form in `raw`, including fields the types do not model.
pub(crate) fn apply_changes(raw: &mut Value, before: &Value, after: &Value) {
    if before == after {
        return;
    }
    match (raw, before, after) {
        (Value::Object(raw), Value::Object(before), Value::Object(after)) => {
            for (key, value) in after {
                let previous = before.get(key);
                if previous == Some(value) {
                    continue;
                }
                if let (Some(current), Some(previous)) = (raw.get_mut(key), previous) {
                    apply_changes(current, previous, value);
                    continue;
                }
                raw.insert(key.clone(), value.clone());
            }
            for key in before.keys().filter(|k| !after.contains_key(*k)) {
                raw.remove(key);
            }
        }
        (Value::Array(raw), Value::Array(before), Value::Array(after))
            if raw.len() == before.len() && before.len() == after.len() =>
        {
            for ((current, previous), value) in raw.iter_mut().zip(before).zip(after) {
                apply_changes(current, previous, value);
            }
        }
        (raw, _, after) => *raw = after.clone(),
    }
}

/// A denial carrying the error's message, code and reason.
pub(crate) fn deny(req: &AdmissionRequest<DynamicObject>, e: &Error) -> AdmissionResponse {
    let category = e.category();
    let mut res = AdmissionResponse::from(req).deny(e.to_string());
    res.result.code = category.code();
    res.result.reason = category.reason().to_string();
    res
}
