use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::{error_response, validate_session};
use crate::models::SendMessageRequest;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/conversations")
            .route("/{id}/messages", web::get().to(list_messages))
            .route("/{id}/messages", web::post().to(send_message)),
    );
}

fn conversation_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "success": false,
        "error": "Conversation not found"
    }))
}

async fn list_messages(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let tenant_id = match validate_session(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let conversation_id = path.into_inner();

    match state.db.get_conversation_for_tenant(&tenant_id, conversation_id) {
        Ok(Some(_)) => {}
        Ok(None) => return conversation_not_found(),
        Err(e) => return error_response(&e),
    }

    match state.db.list_messages(conversation_id) {
        Ok(messages) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "messages": messages
        })),
        Err(e) => error_response(&e),
    }
}

/// Send through the tenant's own provider account, then record the message.
/// Nothing is stored when the provider refuses.
async fn send_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<SendMessageRequest>,
) -> impl Responder {
    let tenant_id = match validate_session(&state, &req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let conversation_id = path.into_inner();
    let content = body.content.trim();
    if content.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "success": false,
            "error": "Message content is required"
        }));
    }

    let conversation = match state.db.get_conversation_for_tenant(&tenant_id, conversation_id) {
        Ok(Some(c)) => c,
        Ok(None) => return conversation_not_found(),
        Err(e) => return error_response(&e),
    };
    let client = match state.db.get_client(&tenant_id, conversation.client_id) {
        Ok(Some(c)) => c,
        Ok(None) => return conversation_not_found(),
        Err(e) => return error_response(&e),
    };

    let sender = match state.resolver.resolve_sender(&tenant_id, body.channel) {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };

    let external_id = match sender.send_text(&client.phone_number, content).await {
        Ok(id) => id,
        Err(details) => {
            log::warn!(
                "[DISPATCH] {} send for tenant {} failed: {}",
                sender.channel().as_ref(),
                tenant_id,
                details
            );
            return HttpResponse::BadGateway().json(serde_json::json!({
                "success": false,
                "error": "Message could not be delivered",
                "details": details
            }));
        }
    };

    match state.db.append_outbound_message(
        conversation.id,
        content,
        sender.channel(),
        Some(&external_id),
    ) {
        Ok(message) => {
            log::info!(
                "[DISPATCH] Sent {} to client {} for tenant {}",
                external_id,
                client.id,
                tenant_id
            );
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": message
            }))
        }
        Err(e) => error_response(&e),
    }
}
