use actix_web::{web, HttpResponse, Responder};

use crate::models::Provider;
use crate::AppState;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/api/health/config").route(web::get().to(get_config_status)));
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION
    }))
}

/// Which process-wide webhook fallbacks are set, and how many tenants have
/// each provider active. No secret material.
async fn get_config_status(state: web::Data<AppState>) -> impl Responder {
    let mut active = serde_json::Map::new();
    for provider in Provider::all() {
        let count = match state.store.active_records(provider) {
            Ok(records) => records.len(),
            Err(e) => {
                log::error!("Failed to count active {} records: {}", provider, e);
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error"
                }));
            }
        };
        active.insert(provider.as_str().to_string(), serde_json::json!(count));
    }

    HttpResponse::Ok().json(serde_json::json!({
        "public_base_url_configured": state.config.public_base_url.is_some(),
        "twilio_fallback_secret": state.config.twilio_auth_token.is_some(),
        "stripe_fallback_secret": state.config.stripe_webhook_secret.is_some(),
        "whatsapp_fallback_verify_token": state.config.whatsapp_verify_token.is_some(),
        "active_integrations": active
    }))
}
