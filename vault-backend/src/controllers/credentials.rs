//! Integration credential endpoints: schema, masked status, save,
//! deactivate and live connection test.

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::{error_response, parse_provider, validate_session};
use crate::models::provider::provider_schemas;
use crate::models::SaveCredentialsRequest;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/integrations")
            .route("/schema", web::get().to(get_schema))
            .route("/{provider}", web::get().to(get_credentials))
            .route("/{provider}", web::post().to(save_credentials))
            .route("/{provider}/deactivate", web::post().to(deactivate_credentials))
            .route("/{provider}/test", web::post().to(test_credentials)),
    );
}

async fn get_schema(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = validate_session(&state, &req) {
        return resp;
    }
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "providers": provider_schemas()
    }))
}

async fn get_credentials(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let tenant_id = match validate_session(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let provider = match parse_provider(&path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match state.store.status(&tenant_id, provider) {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => error_response(&e),
    }
}

async fn save_credentials(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<SaveCredentialsRequest>,
) -> impl Responder {
    let tenant_id = match validate_session(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let provider = match parse_provider(&path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let fields = match body.into_inner().into_string_fields() {
        Ok(f) => f,
        Err(message) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "error": message
            }));
        }
    };

    match state.store.save(&tenant_id, provider, fields) {
        Ok(metadata) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "integration": metadata
        })),
        Err(e) => {
            log::warn!("[VAULT] Save of {} for tenant {} failed: {}", provider, tenant_id, e);
            error_response(&e)
        }
    }
}

async fn deactivate_credentials(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let tenant_id = match validate_session(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let provider = match parse_provider(&path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match state.store.deactivate(&tenant_id, provider) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": format!("{} deactivated", provider.label())
        })),
        Ok(false) => HttpResponse::NotFound().json(serde_json::json!({
            "success": false,
            "error": format!("{} is not configured", provider.label())
        })),
        Err(e) => error_response(&e),
    }
}

/// Resolve the provider client and make one authenticated call. A provider
/// rejection comes back as 502 with the provider's own message in `details`.
async fn test_credentials(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let tenant_id = match validate_session(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let provider = match parse_provider(&path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let handle = match state.resolver.resolve(&tenant_id, provider) {
        Ok(h) => h,
        Err(e) => return error_response(&e),
    };

    match handle.test_connection().await {
        Ok(description) => {
            if let Err(e) = state.store.mark_synced(&tenant_id, provider) {
                log::error!("[VAULT] Failed to stamp last sync for {}: {}", provider, e);
            }
            log::info!("[DISPATCH] {} test passed for tenant {}", provider, tenant_id);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": format!("Connected to {}", description)
            }))
        }
        Err(details) => {
            log::warn!("[DISPATCH] {} test failed for tenant {}: {}", provider, tenant_id, details);
            HttpResponse::BadGateway().json(serde_json::json!({
                "success": false,
                "error": format!("Could not connect to {}", provider.label()),
                "details": details
            }))
        }
    }
}
