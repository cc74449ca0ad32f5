use actix_web::{post, web::Data, web::Json, HttpResponse, Responder};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{field, info, instrument, warn, Span};

use super::{validate_primary_unchanged, validate_unique_primary};
use crate::resources::controllerregistrations::ControllerRegistration;
use crate::webhooks::{decode, deny, operation_label};
use crate::{telemetry, Error, Result, State};

pub const WEBHOOK: &str = "controllerregistrations";

#[post("/webhooks/validate/controllerregistrations")]
pub async fn validate(
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

#[instrument(skip_all, fields(trace_id, name = %req.name, operation = operation_label(&req.operation)))]
async fn admit(state: &State, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    if let Some(trace_id) = telemetry::get_trace_id() {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _timer = state.metrics.count_and_measure(WEBHOOK, &req.operation);
    state.record_event().await;

    match validate_request(state, req) {
        Ok(()) => AdmissionResponse::from(req),
        Err(e) => {
            info!("Rejecting ControllerRegistration \"{}\": {e}", req.name);
            state.metrics.rejection(WEBHOOK, &e);
            deny(req, &e)
        }
    }
}

fn validate_request(state: &State, req: &AdmissionRequest<DynamicObject>) -> Result<()> {
    if matches!(req.operation, Operation::Delete | Operation::Connect)
        || req.sub_resource.as_deref().is_some_and(|s| !s.is_empty())
    {
        return Ok(());
    }
    if !state.is_ready() {
        return Err(Error::NotReady);
    }

    let obj = req.object.as_ref().ok_or_else(|| Error::MissingObject {
        operation: operation_label(&req.operation).to_string(),
    })?;
    let registration: ControllerRegistration = decode(obj)?;

    if let (Operation::Update, Some(old)) = (&req.operation, &req.old_object) {
        let old: ControllerRegistration = decode(old)?;
        validate_primary_unchanged(&registration, &old)?;
    }
    validate_unique_primary(
        &registration,
        state.catalog.controller_registrations.as_ref(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};
    use serde_json::json;

    use super::*;
    use crate::catalog::Readiness;
    use crate::webhooks::controllerregistration::tests::registration;
    use crate::webhooks::testing::{catalog, response, review, state};

    const RESOURCE: (&str, &str, &str) = (
        "core.gardener.cloud",
        "ControllerRegistration",
        "controllerregistrations",
    );

    async fn call(state: State, body: serde_json::Value) -> AdmissionReview<DynamicObject> {
        let app = test::init_service(App::new().app_data(Data::new(state)).service(validate)).await;
        let req = test::TestRequest::post()
            .uri("/webhooks/validate/controllerregistrations")
            .set_json(body)
            .to_request();
        test::call_and_read_body_json(&app, req).await
    }

    fn object(reg: &ControllerRegistration) -> serde_json::Value {
        serde_json::to_value(reg).unwrap()
    }

    #[actix_web::test]
    async fn second_primary_claim_is_forbidden() {
        let owner = registration("provider-aws", &[("Worker", "aws", Some(true))]);
        let state = state(catalog(vec![], vec![], vec![owner]));

        let claim = registration("provider-aws-fork", &[("Worker", "aws", Some(true))]);
        let res = call(state, review(RESOURCE, "CREATE", Some(object(&claim)), None)).await;

        let res = response(&res);
        assert_eq!(res["allowed"], json!(false));
        assert_eq!(res["status"]["code"], json!(403));
        assert_eq!(res["status"]["reason"], json!("Forbidden"));
        assert!(res["status"]["message"]
            .as_str()
            .unwrap()
            .contains("Worker/aws as primary"));
    }

    #[actix_web::test]
    async fn secondary_claim_is_allowed() {
        let owner = registration("provider-aws", &[("Worker", "aws", Some(true))]);
        let state = state(catalog(vec![], vec![], vec![owner]));

        let observer = registration("observer", &[("Worker", "aws", Some(false))]);
        let res = call(state, review(RESOURCE, "CREATE", Some(object(&observer)), None)).await;
        assert_eq!(response(&res)["allowed"], json!(true));
    }

    #[actix_web::test]
    async fn flipping_primary_is_invalid() {
        let old = registration("provider-aws", &[("Worker", "aws", Some(true))]);
        let state = state(catalog(vec![], vec![], vec![old.clone()]));

        let new = registration("provider-aws", &[("Worker", "aws", Some(false))]);
        let res = call(
            state,
            review(RESOURCE, "UPDATE", Some(object(&new)), Some(object(&old))),
        )
        .await;

        let res = response(&res);
        assert_eq!(res["allowed"], json!(false));
        assert_eq!(res["status"]["code"], json!(422));
        assert_eq!(res["status"]["reason"], json!("Invalid"));
    }

    #[actix_web::test]
    async fn deletes_are_not_evaluated() {
        let mut catalog = catalog(vec![], vec![], vec![]);
        catalog.readiness = Readiness::default();
        let old = registration("provider-aws", &[("Worker", "aws", Some(true))]);

        let res = call(state(catalog), review(RESOURCE, "DELETE", None, Some(object(&old)))).await;
        assert_eq!(response(&res)["allowed"], json!(true));
    }

    #[actix_web::test]
    async fn requests_are_rejected_until_caches_synced() {
        let mut catalog = catalog(vec![], vec![], vec![]);
        catalog.readiness = Readiness::default();

        let reg = registration("provider-aws", &[("Worker", "aws", None)]);
        let res = call(state(catalog), review(RESOURCE, "CREATE", Some(object(&reg)), None)).await;

        let res = response(&res);
        assert_eq!(res["allowed"], json!(false));
        assert_eq!(
            res["status"]["message"],
            json!("not yet ready to handle request")
        );
    }
}
