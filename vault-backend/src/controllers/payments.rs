use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::{error_response, validate_session};
use crate::models::{CreatePaymentRequest, CreatePaymentResponse};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/payments").route("", web::post().to(create_payment)));
}

fn failure(error: &str, details: Option<String>) -> CreatePaymentResponse {
    CreatePaymentResponse {
        success: false,
        payment: None,
        client_secret: None,
        error: Some(error.to_string()),
        details,
    }
}

/// Create a PaymentIntent on the tenant's own Stripe account and record it
/// as pending. Completion arrives later through the signed webhook.
async fn create_payment(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreatePaymentRequest>,
) -> impl Responder {
    let tenant_id = match validate_session(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let request = body.into_inner();

    if request.amount_cents <= 0 {
        return HttpResponse::BadRequest().json(failure("Amount must be a positive number of cents", None));
    }
    let currency = request.currency.trim().to_lowercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return HttpResponse::BadRequest().json(failure("Currency must be a three-letter ISO code", None));
    }

    let stripe = match state.resolver.resolve_stripe(&tenant_id) {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };

    let mut metadata = vec![("tenant_id", tenant_id.clone())];
    if let Some(id) = request.appointment_id {
        metadata.push(("appointment_id", id.to_string()));
    }
    if let Some(id) = request.client_id {
        metadata.push(("client_id", id.to_string()));
    }

    let intent = match stripe
        .create_payment_intent(request.amount_cents, &currency, &metadata)
        .await
    {
        Ok(i) => i,
        Err(details) => {
            log::warn!("[DISPATCH] PaymentIntent for tenant {} failed: {}", tenant_id, details);
            return HttpResponse::BadGateway().json(failure("Payment could not be created", Some(details)));
        }
    };

    match state.db.insert_payment(
        &tenant_id,
        &intent.id,
        intent.amount,
        &intent.currency,
        request.client_id,
        request.appointment_id,
    ) {
        Ok(payment) => {
            log::info!(
                "[DISPATCH] Created {} ({}) for tenant {}",
                intent.id,
                intent.status,
                tenant_id
            );
            HttpResponse::Ok().json(CreatePaymentResponse {
                success: true,
                payment: Some(payment),
                client_secret: intent.client_secret,
                error: None,
                details: None,
            })
        }
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};

    use super::*;
    use crate::controllers::test_support::{app_state, bearer};

    #[actix_web::test]
    async fn test_payment_requires_stripe() {
        let (state, _dir) = app_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/payments")
            .insert_header(("Authorization", bearer(&state, "tenant-a")))
            .set_json(serde_json::json!({"amount_cents": 5000, "appointment_id": 7}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "not_configured");
    }

    #[actix_web::test]
    async fn test_payment_validation() {
        let (state, _dir) = app_state();
        let auth = bearer(&state, "tenant-a");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        for body in [
            serde_json::json!({"amount_cents": 0}),
            serde_json::json!({"amount_cents": 100, "currency": "dollars"}),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/payments")
                .insert_header(("Authorization", auth.clone()))
                .set_json(body)
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 400);
        }
    }
}
