use actix_web::{post, web::Data, web::Json, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, field, info, instrument, warn, Span};

use super::mutate_shoot;
use crate::resources::shoots::Shoot;
use crate::webhooks::{apply_changes, decode, deny, operation_label};
use crate::{telemetry, Error, Result, State};

pub const WEBHOOK: &str = "shoots";

#[post("/webhooks/mutate/shoots")]
pub async fn mutate(
    state: Data<State>,
    review: Json<AdmissionReview<DynamicObject>>,
) -> impl Responder {
    let req: AdmissionRequest<DynamicObject> = match review.into_inner().try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!("Invalid admission review: {e}");
            return HttpResponse::Ok().json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    HttpResponse::Ok().json(admit(&state, &req).await.into_review())
}

#[instrument(skip_all, fields(trace_id, shoot = %req.name, namespace = ?req.namespace, operation = operation_label(&req.operation)))]
async fn admit(state: &State, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    if let Some(trace_id) = telemetry::get_trace_id() {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _timer = state.metrics.count_and_measure(WEBHOOK, &req.operation);
    state.record_event().await;

    let res = mutate_request(state, req, Utc::now()).and_then(|patch| match patch {
        Some(patch) => {
            debug!("Patching Shoot with {} operations", patch.0.len());
            Ok(AdmissionResponse::from(req).with_patch(patch)?)
        }
        None => Ok(AdmissionResponse::from(req)),
    });

    match res {
        Ok(res) => res,
        Err(e) => {
            info!("Rejecting Shoot \"{}\": {e}", req.name);
            state.metrics.rejection(WEBHOOK, &e);
            deny(req, &e)
        }
    }
}

/// Defaults the submitted Shoot and returns the patch turning the submitted object into the
/// defaulted one.
fn mutate_request(
    state: &State,
    req: &AdmissionRequest<DynamicObject>,
    now: DateTime<Utc>,
) -> Result<Option<json_patch::Patch>> {
    if matches!(req.operation, Operation::Delete | Operation::Connect) {
        return Ok(None);
    }
    if !state.is_ready() {
        return Err(Error::NotReady);
    }

    let obj = req.object.as_ref().ok_or_else(|| Error::MissingObject {
        operation: operation_label(&req.operation).to_string(),
    })?;
    let submitted: Shoot = decode(obj)?;
    let old: Option<Shoot> = match (&req.operation, &req.old_object) {
        (Operation::Update, Some(old)) => Some(decode(old)?),
        (Operation::Update, None) => {
            return Err(Error::MissingObject {
                operation: "UPDATE".to_string(),
            })
        }
        _ => None,
    };

    let mut shoot = submitted.clone();
    mutate_shoot(
        &mut shoot,
        old.as_ref(),
        req.user_info.username.as_deref(),
        &state.catalog,
        now,
    )?;

    let raw = serde_json::to_value(obj)?;
    let mut defaulted = raw.clone();
    apply_changes(
        &mut defaulted,
        &serde_json::to_value(&submitted)?,
        &serde_json::to_value(&shoot)?,
    );
    let patch = json_patch::diff(&raw, &defaulted);
    Ok((!patch.0.is_empty()).then_some(patch))
}
