//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints:
//! - `POST /v1/chat/completions`
//! - `GET /health`

use crate::{config::GatewayConfig, streaming};
use actix_cors::Cors;
use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use curio_cursor::{translate, CompletionMeta, CursorClient, CursorError};
use curio_protocol::{bearer_token, validate_request, ErrorBody};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub client: CursorClient,
}

impl AppState {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client =
            CursorClient::new(config.client_config()).context("failed to build cursor client")?;
        Ok(Self { client })
    }
}

pub async fn serve(config: GatewayConfig) -> Result<()> {
    let addr = config.bind_addr();
    info!(
        addr = %addr,
        upstream = %config.cursor_url,
        checksum_override = config.checksum_override.is_some(),
        "curio-proxy listening"
    );

    let state = web::Data::new(AppState::new(&config)?);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

/// Register the gateway routes on an app.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).route(
        "/v1/chat/completions",
        web::post().to(handle_chat_completions),
    );
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handle_chat_completions(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let auth_header = req_http
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    let Some(credential) = bearer_token(auth_header) else {
        return HttpResponse::Unauthorized()
            .json(ErrorBody::new("authentication_error", "Unauthorized"));
    };

    let req = match validate_request(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "rejected chat request");
            return HttpResponse::UnprocessableEntity()
                .json(ErrorBody::new("invalid_request_error", e.message));
        }
    };

    debug!(
        model = %req.model,
        stream = req.stream,
        messages = req.messages.len(),
        "chat completion request"
    );

    let upstream = match state.client.send(credential, &req).await {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    if req.stream {
        let meta = CompletionMeta::new(&req.model);
        let stream = streaming::handle_streaming(upstream.bytes_stream(), meta).map(|r| {
            r.map(web::Bytes::from).map_err(|e| {
                error!(error = %e, "stream relay failed");
                actix_web::error::ErrorInternalServerError(e.to_string())
            })
        });

        return HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header(("cache-control", "no-cache"))
            .streaming(stream);
    }

    match translate(upstream.bytes_stream(), &req.model).await {
        Ok(response) => HttpResponse::Ok().json(response.into_completion()),
        Err(e) => error_response(&e),
    }
}

/// Status code and OpenAI error type for a core failure.
pub fn error_status(err: &CursorError) -> (StatusCode, &'static str) {
    match err {
        CursorError::MalformedCredential(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
        CursorError::SchemaViolation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request_error")
        }
        CursorError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
        CursorError::TransportUnavailable(_)
        | CursorError::UpstreamStatus { .. }
        | CursorError::Interrupted(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
    }
}

fn error_response(err: &CursorError) -> HttpResponse {
    let (status, kind) = error_status(err);
    if err.is_client_error() {
        warn!(error = %err, "request rejected");
    } else {
        error!(error = %err, "request failed");
    }
    HttpResponse::build(status).json(ErrorBody::new(kind, err.to_string()))
}
