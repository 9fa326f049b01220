//! Provider webhook endpoints (no session auth - each provider's own
//! verification protocol applies)

use std::collections::HashSet;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::error::VaultError;
use crate::inbound::{self, InboundMessage, TenantResolution};
use crate::models::{CredentialRecord, PaymentStatus, Provider};
use crate::vault::ProviderHandle;
use crate::webhooks::{stripe, twilio, whatsapp};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks")
            .route("/whatsapp", web::get().to(whatsapp_challenge))
            .route("/whatsapp", web::post().to(whatsapp_delivery))
            .route("/twilio", web::post().to(twilio_delivery))
            .route("/stripe", web::post().to(stripe_event)),
    );
}

fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().body("Forbidden")
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "success": false,
        "error": "Internal server error"
    }))
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|h| h.to_str().ok())
}

/// Decrypt one secret from each active record of `provider`. Records whose
/// secret will not open are logged and skipped.
fn tenant_secrets(state: &AppState, provider: Provider, field: &str) -> Vec<(CredentialRecord, String)> {
    let records = match state.store.active_records(provider) {
        Ok(r) => r,
        Err(e) => {
            log::error!("[WEBHOOK] Failed to load active {} records: {}", provider, e);
            return Vec::new();
        }
    };

    records
        .into_iter()
        .filter_map(|record| match state.store.reveal(&record, field) {
            Ok(Some(secret)) => Some((record, secret)),
            Ok(None) => None,
            Err(e) => {
                log::error!("[WEBHOOK] Skipping tenant {}: {}", record.tenant_id, e);
                None
            }
        })
        .collect()
}

/// GET handshake. Echoes `hub.challenge` as plain text on success; anything
/// else is a bare 403.
async fn whatsapp_challenge(
    state: web::Data<AppState>,
    query: web::Query<whatsapp::ChallengeQuery>,
) -> HttpResponse {
    let mut expected: Vec<String> = tenant_secrets(&state, Provider::Whatsapp, "verify_token")
        .into_iter()
        .map(|(_, token)| token)
        .collect();
    if let Some(token) = &state.config.whatsapp_verify_token {
        expected.push(token.clone());
    }

    match whatsapp::verify_challenge(&query, &expected) {
        Ok(challenge) => {
            log::info!("[WEBHOOK] WhatsApp subscription verified");
            HttpResponse::Ok().content_type("text/plain").body(challenge)
        }
        Err(e) => {
            log::warn!("[WEBHOOK] WhatsApp handshake rejected: {}", e);
            forbidden()
        }
    }
}

async fn whatsapp_delivery(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let payload: whatsapp::WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("[WEBHOOK] Unparseable WhatsApp payload: {}", e);
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "error": "Invalid payload"
            }));
        }
    };

    let messages = whatsapp::extract_messages(&payload);
    if messages.is_empty() {
        // Status callbacks and other change types
        return HttpResponse::Ok().json(serde_json::json!({"success": true}));
    }

    // Route every message first and authenticate each tenant once, so nothing
    // is written unless the whole delivery checks out
    let signature = header(&req, whatsapp::SIGNATURE_HEADER);
    let mut verified: HashSet<String> = HashSet::new();
    let mut routed: Vec<(InboundMessage, CredentialRecord)> = Vec::new();

    for message in messages {
        let provider = message.provider();
        let resolution =
            match inbound::resolve_tenant(&state.store, provider, message.routing_key.as_deref()) {
                Ok(r) => r,
                Err(e) => {
                    log::error!("[WEBHOOK] Tenant resolution failed: {}", e);
                    return internal_error();
                }
            };
        let Some(record) = routed_record(&resolution, provider, message.routing_key.as_deref()) else {
            continue;
        };

        if !verified.contains(&record.tenant_id) {
            let app_secret = match state.store.reveal(&record, "app_secret") {
                Ok(s) => s,
                Err(e) => {
                    log::error!("[WEBHOOK] {}", e);
                    return internal_error();
                }
            };
            if let Some(secret) = app_secret {
                if let Err(e) = whatsapp::verify_signature(&body, signature, &secret) {
                    log::warn!("[WEBHOOK] WhatsApp delivery for tenant {} rejected: {}", record.tenant_id, e);
                    return forbidden();
                }
            }
            verified.insert(record.tenant_id.clone());
        }
        routed.push((message, record));
    }

    for (message, record) in routed {
        let outcome = match inbound::ingest(&state.db, &record.tenant_id, &message) {
            Ok(o) => o,
            Err(e) => {
                log::error!("[INBOUND] WhatsApp ingest failed for tenant {}: {}", record.tenant_id, e);
                return internal_error();
            }
        };

        if outcome.is_duplicate() {
            continue;
        }
        log::info!(
            "[INBOUND] WhatsApp message from {} for tenant {} (conversation {})",
            outcome.client.phone_number,
            record.tenant_id,
            outcome.conversation.id
        );

        if let Some(message_id) = message.external_id {
            spawn_mark_read(&state, &record, message_id);
        }
    }

    HttpResponse::Ok().json(serde_json::json!({"success": true}))
}

/// Best-effort read receipt. Runs after the response is decided; a failure is
/// logged and never retried.
fn spawn_mark_read(state: &AppState, record: &CredentialRecord, message_id: String) {
    let client = match state.resolver.build(record) {
        Ok(ProviderHandle::Whatsapp(client)) => client,
        Ok(_) => return,
        Err(e) => {
            log::warn!("[DISPATCH] Cannot mark {} read: {}", message_id, e);
            return;
        }
    };

    tokio::spawn(async move {
        if let Err(e) = client.mark_read(&message_id).await {
            log::warn!("[DISPATCH] Mark-read for {} failed: {}", message_id, e);
        }
    });
}

/// The record an event routes to. Unroutable events are acknowledged to the
/// provider and dropped here.
fn routed_record(
    resolution: &TenantResolution,
    provider: Provider,
    routing_key: Option<&str>,
) -> Option<CredentialRecord> {
    match resolution {
        TenantResolution::Unknown => {
            log::warn!("[WEBHOOK] No active {} tenant for {:?}, dropping", provider, routing_key);
        }
        TenantResolution::Ambiguous(n) => {
            log::warn!(
                "[WEBHOOK] {} active {} tenants and none claims {:?}, dropping",
                n,
                provider,
                routing_key
            );
        }
        TenantResolution::Routed(_) | TenantResolution::SoleActive(_) => {}
    }
    resolution.record().cloned()
}

async fn twilio_delivery(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let params = twilio::parse_form(&body);
    let message = twilio::extract_message(&params);
    let routing_key = message.as_ref().and_then(|m| m.routing_key.clone());

    let record = match inbound::resolve_tenant(&state.store, Provider::Twilio, routing_key.as_deref()) {
        Ok(resolution) => routed_record(&resolution, Provider::Twilio, routing_key.as_deref()),
        Err(e) => {
            log::error!("[WEBHOOK] Tenant resolution failed: {}", e);
            return internal_error();
        }
    };

    let tenant_token = match &record {
        Some(r) => match state.store.reveal(r, "auth_token") {
            Ok(token) => token,
            Err(e) => {
                log::error!("[WEBHOOK] {}", e);
                return internal_error();
            }
        },
        None => None,
    };
    let Some(auth_token) = tenant_token.or_else(|| state.config.twilio_auth_token.clone()) else {
        log::warn!("[WEBHOOK] No Twilio auth token to verify against, rejecting");
        return forbidden();
    };

    let conn = req.connection_info();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| req.path());
    let url = twilio::request_url(
        state.config.public_base_url.as_deref(),
        conn.scheme(),
        conn.host(),
        path_and_query,
    );

    if let Err(e) = twilio::verify_signature(&url, &params, header(&req, twilio::SIGNATURE_HEADER), &auth_token) {
        log::warn!("[WEBHOOK] Twilio request rejected: {}", e);
        return forbidden();
    }

    if let (Some(message), Some(record)) = (message, record) {
        match inbound::ingest(&state.db, &record.tenant_id, &message) {
            Ok(outcome) if !outcome.is_duplicate() => log::info!(
                "[INBOUND] SMS from {} for tenant {} (conversation {})",
                outcome.client.phone_number,
                record.tenant_id,
                outcome.conversation.id
            ),
            Ok(_) => {}
            Err(e) => {
                log::error!("[INBOUND] SMS ingest failed for tenant {}: {}", record.tenant_id, e);
                return internal_error();
            }
        }
    }

    HttpResponse::Ok()
        .content_type("text/xml")
        .body(twilio::EMPTY_TWIML)
}

/// Signed-event endpoint. Verification failures are 400 with the reason.
async fn stripe_event(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let Some(signature) = header(&req, stripe::SIGNATURE_HEADER) else {
        return HttpResponse::BadRequest().body("Missing Stripe-Signature header");
    };

    // The tenant is whichever record's secret authenticates the envelope
    let mut candidates: Vec<(Option<String>, String)> =
        tenant_secrets(&state, Provider::Stripe, "webhook_secret")
            .into_iter()
            .map(|(record, secret)| (Some(record.tenant_id), secret))
            .collect();
    if let Some(secret) = &state.config.stripe_webhook_secret {
        candidates.push((None, secret.clone()));
    }
    if candidates.is_empty() {
        log::warn!("[WEBHOOK] Stripe event received but no webhook secret is configured");
        return HttpResponse::BadRequest().body("No webhook secret configured");
    }

    let now = Utc::now().timestamp();
    let tolerance = state.config.stripe_webhook_tolerance_secs;
    let mut last_error = None;
    let mut tenant_id = None;
    let mut authenticated = false;
    for (candidate_tenant, secret) in candidates {
        match stripe::verify_signature(&body, signature, &secret, tolerance, now) {
            Ok(()) => {
                tenant_id = candidate_tenant;
                authenticated = true;
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    if !authenticated {
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Signature verification failed".to_string());
        log::warn!("[WEBHOOK] Stripe event rejected: {}", reason);
        return HttpResponse::BadRequest().body(reason);
    }

    let event: stripe::Event = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("[WEBHOOK] Verified Stripe body is not an event: {}", e);
            return HttpResponse::BadRequest().body(format!("Invalid event payload: {}", e));
        }
    };

    match apply_stripe_event(&state, &event, tenant_id.as_deref()) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({"received": true})),
        Err(e) => {
            log::error!("[WEBHOOK] Failed to apply Stripe event {}: {}", event.id, e);
            internal_error()
        }
    }
}

/// Apply a verified event. Transitions never leave a refunded payment and a
/// failure never replaces a completed one, so redelivery in any order
/// converges on the same rows.
fn apply_stripe_event(
    state: &AppState,
    event: &stripe::Event,
    tenant_id: Option<&str>,
) -> Result<(), VaultError> {
    let (payment_intent_id, status, appointment_id) = match event.classify() {
        stripe::StripeEvent::PaymentSucceeded {
            payment_intent_id,
            appointment_id,
        } => (payment_intent_id, PaymentStatus::Completed, appointment_id),
        stripe::StripeEvent::PaymentFailed { payment_intent_id } => {
            (payment_intent_id, PaymentStatus::Failed, None)
        }
        stripe::StripeEvent::ChargeRefunded { payment_intent_id } => {
            (payment_intent_id, PaymentStatus::Refunded, None)
        }
        stripe::StripeEvent::Ignored(event_type) => {
            log::info!("[WEBHOOK] Ignoring Stripe event {} ({})", event.id, event_type);
            return Ok(());
        }
    };

    let rows = state
        .db
        .settle_payment(&payment_intent_id, status, appointment_id, tenant_id)?;
    if rows == 0 {
        log::warn!(
            "[WEBHOOK] Stripe event {} left payment {} unchanged (unknown or already settled)",
            event.id,
            payment_intent_id
        );
    } else {
        log::info!(
            "[WEBHOOK] Payment {} is now {}",
            payment_intent_id,
            status.as_ref()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};

    use super::*;
    use crate::controllers::test_support::app_state;
    use crate::models::CredentialFields;

    fn fields(pairs: &[(&str, &str)]) -> CredentialFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn configure_whatsapp(state: &web::Data<AppState>, tenant: &str, app_secret: Option<&str>) {
        let mut f = fields(&[
            ("phone_number_id", "PNID-1"),
            ("business_account_id", "WABA-1"),
            ("access_token", "EAAG-token"),
            ("verify_token", "tenant-verify"),
        ]);
        if let Some(secret) = app_secret {
            f.insert("app_secret".to_string(), secret.to_string());
        }
        state.store.save(tenant, Provider::Whatsapp, f).unwrap();
    }

    fn whatsapp_body(message_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{"id": "WABA-1", "changes": [{"field": "messages", "value": {
                "messaging_product": "whatsapp",
                "metadata": {"display_phone_number": "15550009999", "phone_number_id": "PNID-1"},
                "messages": [{"from": "15550001", "id": message_id, "timestamp": "1700000000",
                              "type": "text", "text": {"body": "Can I book Friday?"}}]
            }}]}]
        }))
        .unwrap()
    }

    #[actix_web::test]
    async fn test_whatsapp_challenge() {
        let (state, _dir) = app_state();
        configure_whatsapp(&state, "tenant-t", None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token=tenant-verify&hub.challenge=CHALLENGE_ACCEPTED")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(test::read_body(resp).await, "CHALLENGE_ACCEPTED");

        for uri in [
            "/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=CHALLENGE_ACCEPTED",
            "/webhooks/whatsapp?hub.mode=unsubscribe&hub.verify_token=tenant-verify&hub.challenge=CHALLENGE_ACCEPTED",
        ] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), 403);
            let body = test::read_body(resp).await;
            assert!(!String::from_utf8_lossy(&body).contains("CHALLENGE_ACCEPTED"));
        }
    }

    #[actix_web::test]
    async fn test_whatsapp_end_to_end() {
        let (state, _dir) = app_state();
        configure_whatsapp(&state, "tenant-t", None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/webhooks/whatsapp")
            .insert_header(("Content-Type", "application/json"))
            .set_payload(whatsapp_body("wamid.A"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let client = state.db.find_client_by_phone("tenant-t", "+15550001").unwrap().unwrap();
        assert_eq!(client.name, "+15550001");
        assert_eq!(state.db.count_clients("tenant-t").unwrap(), 1);
        assert_eq!(state.db.count_conversations("tenant-t").unwrap(), 1);

        // Redelivery of the same message id
        let req = test::TestRequest::post()
            .uri("/webhooks/whatsapp")
            .set_payload(whatsapp_body("wamid.A"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let conn = state.db.conn().unwrap();
        let (unread, messages): (i64, i64) = conn
            .query_row(
                "SELECT c.unread_count, (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
                 FROM conversations c WHERE c.tenant_id = 'tenant-t'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(unread, 1);
        assert_eq!(messages, 1);
        let sender: String = conn
            .query_row("SELECT sender_type FROM messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sender, "client");
    }

    #[actix_web::test]
    async fn test_whatsapp_signature_enforced_when_app_secret_set() {
        let (state, _dir) = app_state();
        configure_whatsapp(&state, "tenant-t", Some("app-secret"));
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;
        let body = whatsapp_body("wamid.B");

        let req = test::TestRequest::post()
            .uri("/webhooks/whatsapp")
            .set_payload(body.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
        assert_eq!(state.db.count_clients("tenant-t").unwrap(), 0);

        let req = test::TestRequest::post()
            .uri("/webhooks/whatsapp")
            .insert_header((whatsapp::SIGNATURE_HEADER, whatsapp::sign(&body, "app-secret")))
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
        assert_eq!(state.db.count_clients("tenant-t").unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_twilio_signature() {
        let (state, _dir) = app_state();
        state
            .store
            .save(
                "tenant-t",
                Provider::Twilio,
                fields(&[("account_sid", "AC1"), ("auth_token", "twilio-token"), ("phone_number", "+15550009999")]),
            )
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let form = "To=%2B15550009999&From=%2B15550001&Body=Hi&MessageSid=SM1&NumMedia=0";
        let url = "https://vault.example.com/webhooks/twilio";
        let signature =
            twilio::compute_signature(url, &twilio::parse_form(form.as_bytes()), "twilio-token").unwrap();

        let req = test::TestRequest::post()
            .uri("/webhooks/twilio")
            .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
            .insert_header((twilio::SIGNATURE_HEADER, signature.clone()))
            .set_payload(form.replace("Body=Hi", "Body=Hacked"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::post()
            .uri("/webhooks/twilio")
            .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
            .insert_header((twilio::SIGNATURE_HEADER, signature))
            .set_payload(form)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(test::read_body(resp).await, twilio::EMPTY_TWIML);
        assert!(state.db.find_client_by_phone("tenant-t", "+15550001").unwrap().is_some());
    }

    #[actix_web::test]
    async fn test_stripe_events() {
        let (state, _dir) = app_state();
        state
            .store
            .save(
                "tenant-t",
                Provider::Stripe,
                fields(&[("publishable_key", "pk"), ("secret_key", "sk"), ("webhook_secret", "whsec_t")]),
            )
            .unwrap();
        state.db.insert_payment("tenant-t", "pi_1", 5000, "usd", None, None).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt_1", "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_1", "metadata": {}}}
        }))
        .unwrap();

        let req = test::TestRequest::post()
            .uri("/webhooks/stripe")
            .insert_header((stripe::SIGNATURE_HEADER, stripe::sign(&body, "whsec_wrong", Utc::now().timestamp())))
            .set_payload(body.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert!(!test::read_body(resp).await.is_empty());

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/webhooks/stripe")
                .insert_header((stripe::SIGNATURE_HEADER, stripe::sign(&body, "whsec_t", Utc::now().timestamp())))
                .set_payload(body.clone())
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 200);
        }
        let payment = state.db.get_payment_by_provider_id("pi_1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.paid_at.is_some());
    }

    #[actix_web::test]
    async fn test_stripe_refund_survives_redelivered_success() {
        let (state, _dir) = app_state();
        state
            .store
            .save(
                "tenant-t",
                Provider::Stripe,
                fields(&[("publishable_key", "pk"), ("secret_key", "sk"), ("webhook_secret", "whsec_t")]),
            )
            .unwrap();
        let appointment_id = {
            let conn = state.db.conn().unwrap();
            conn.execute(
                "INSERT INTO appointments (tenant_id, updated_at) VALUES ('tenant-t', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
            conn.last_insert_rowid()
        };
        state
            .db
            .insert_payment("tenant-t", "pi_1", 5000, "usd", None, Some(appointment_id))
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let succeeded = serde_json::json!({
            "id": "evt_1", "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_1", "metadata": {"appointment_id": appointment_id.to_string()}}}
        });
        let refunded = serde_json::json!({
            "id": "evt_2", "type": "charge.refunded",
            "data": {"object": {"id": "ch_1", "payment_intent": "pi_1"}}
        });

        for event in [&succeeded, &refunded, &succeeded] {
            let body = serde_json::to_vec(event).unwrap();
            let req = test::TestRequest::post()
                .uri("/webhooks/stripe")
                .insert_header((stripe::SIGNATURE_HEADER, stripe::sign(&body, "whsec_t", Utc::now().timestamp())))
                .set_payload(body)
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 200);
        }

        let payment = state.db.get_payment_by_provider_id("pi_1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        let appointment_status: String = state
            .db
            .conn()
            .unwrap()
            .query_row("SELECT payment_status FROM appointments WHERE id = ?1", [appointment_id], |r| r.get(0))
            .unwrap();
        assert_eq!(appointment_status, "paid");
    }

    #[actix_web::test]
    async fn test_stripe_success_for_unknown_payment_leaves_appointment() {
        let (state, _dir) = app_state();
        state
            .store
            .save(
                "tenant-t",
                Provider::Stripe,
                fields(&[("publishable_key", "pk"), ("secret_key", "sk"), ("webhook_secret", "whsec_t")]),
            )
            .unwrap();
        let appointment_id = {
            let conn = state.db.conn().unwrap();
            conn.execute(
                "INSERT INTO appointments (tenant_id, updated_at) VALUES ('tenant-t', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
            conn.last_insert_rowid()
        };
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt_1", "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_missing", "metadata": {"appointment_id": appointment_id.to_string()}}}
        }))
        .unwrap();
        let req = test::TestRequest::post()
            .uri("/webhooks/stripe")
            .insert_header((stripe::SIGNATURE_HEADER, stripe::sign(&body, "whsec_t", Utc::now().timestamp())))
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let appointment_status: String = state
            .db
            .conn()
            .unwrap()
            .query_row("SELECT payment_status FROM appointments WHERE id = ?1", [appointment_id], |r| r.get(0))
            .unwrap();
        assert_eq!(appointment_status, "unpaid");
    }
}
