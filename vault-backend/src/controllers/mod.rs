pub mod credentials;
pub mod health;
pub mod messages;
pub mod payments;
pub mod webhooks;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::error::VaultError;
use crate::models::Provider;
use crate::AppState;

/// Shared session validation for controller handlers. Returns the tenant the
/// bearer token belongs to.
pub fn validate_session(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<String, HttpResponse> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").to_string());

    let token = match token {
        Some(t) => t,
        None => {
            return Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "No authorization token provided"
            })));
        }
    };

    match state.db.validate_session(&token) {
        Ok(Some(session)) => Ok(session.tenant_id),
        Ok(None) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid or expired session"
        }))),
        Err(e) => {
            log::error!("Session validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            })))
        }
    }
}

/// Parse the `{provider}` path segment
pub fn parse_provider(raw: &str) -> Result<Provider, HttpResponse> {
    raw.parse::<Provider>().map_err(|_| {
        HttpResponse::NotFound().json(serde_json::json!({
            "success": false,
            "error": format!("Unknown provider '{}'", raw)
        }))
    })
}

/// Map a vault error to an API response. Internal details stay in the log.
pub fn error_response(err: &VaultError) -> HttpResponse {
    match err {
        VaultError::NotConfigured { .. } => HttpResponse::NotFound().json(serde_json::json!({
            "success": false,
            "code": "not_configured",
            "error": err.to_string()
        })),
        VaultError::Validation(message) => HttpResponse::BadRequest().json(serde_json::json!({
            "success": false,
            "code": "validation",
            "error": message
        })),
        VaultError::MissingField { .. } => HttpResponse::UnprocessableEntity().json(serde_json::json!({
            "success": false,
            "code": "incomplete_configuration",
            "error": err.to_string()
        })),
        VaultError::RoutingKeyConflict { .. } => HttpResponse::Conflict().json(serde_json::json!({
            "success": false,
            "code": "routing_key_conflict",
            "error": err.to_string()
        })),
        VaultError::DecryptionFailure { provider, field, .. } => {
            log::error!("[VAULT] {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "code": "decryption_failure",
                "error": format!(
                    "Stored {} credentials could not be read ({}); save them again",
                    provider, field
                )
            }))
        }
        VaultError::WebhookVerification(reason) => HttpResponse::Forbidden().json(serde_json::json!({
            "success": false,
            "error": reason
        })),
        _ => {
            log::error!("Internal error: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "Internal server error"
            }))
        }
    }
}
