//! # HTTP/RPC surface (§6.3)
//!
//! ## Purpose
//!
//! A minimal, optional router in front of the [`Orchestrator`]:
//! `GET /health`, `GET /balances`, `POST /execute`, `POST /webhook/approve`,
//! `POST /reset-daily`. Built directly on `hyper`'s
//! `make_service_fn`/`service_fn`/`Server::bind` shape; this crate has no
//! `axum`/`tower` dependency to reach for instead.

use crate::orchestrator::Orchestrator;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};
use types::{OpportunityId, TokenId};

/// Static bearer-token auth for `/execute`, matching §6.3's "authenticated
/// via a static API token header" — no session/JWT machinery, one shared
/// secret compared in constant-ish time via simple equality (the token is
/// not itself sensitive key material rotated per-request).
pub struct ApiToken(pub String);

pub struct HttpServer {
    orchestrator: Arc<Orchestrator>,
    port: u16,
    api_token: ApiToken,
}

impl HttpServer {
    pub fn new(orchestrator: Arc<Orchestrator>, port: u16, api_token: ApiToken) -> Self {
        Self {
            orchestrator,
            port,
            api_token,
        }
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let orchestrator = self.orchestrator;
        let token = Arc::new(self.api_token.0);

        let make_svc = make_service_fn(move |_conn| {
            let orchestrator = orchestrator.clone();
            let token = token.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle_request(req, orchestrator.clone(), token.clone())
                }))
            }
        });

        info!("http surface listening on http://{addr}");
        let server = Server::bind(&addr).serve(make_svc);
        if let Err(err) = server.await {
            error!(error = %err, "http server error");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    id: String,
    #[allow(dead_code)]
    kind: Option<String>,
    #[allow(dead_code)]
    chain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    id: String,
}

async fn handle_request(
    req: Request<Body>,
    orchestrator: Arc<Orchestrator>,
    token: Arc<String>,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_string();
    debug!(method = %req.method(), path = %path, "http request");

    let result = match (req.method(), path.as_str()) {
        (&Method::GET, "/health") => handle_health(&orchestrator).await,
        (&Method::GET, "/balances") => handle_balances(&req, &orchestrator).await,
        (&Method::POST, "/execute") => handle_execute(req, &orchestrator, &token).await,
        (&Method::POST, "/webhook/approve") => handle_approve(req, &orchestrator).await,
        (&Method::POST, "/reset-daily") => handle_reset_daily(&req, &orchestrator, &token).await,
        _ => Ok(json_response(StatusCode::NOT_FOUND, serde_json::json!({"error": "not found"}))),
    };

    Ok(result.unwrap_or_else(|err| {
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": err.to_string()}),
        )
    }))
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::from("{}")))
}

async fn handle_health(orchestrator: &Orchestrator) -> anyhow::Result<Response<Body>> {
    let health = orchestrator.health().await;
    let status = if health.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(json_response(
        status,
        serde_json::json!({
            "ready": health.ready,
            "chains": health.chains.iter().map(|c| serde_json::json!({
                "chain": c.chain,
                "healthy": c.healthy,
            })).collect::<Vec<_>>(),
            "queue_depths": health.queue_depths,
            "active_workers": health.active_workers,
        }),
    ))
}

/// `GET /balances?token=<symbol>` — per-chain balance of one token for the
/// configured wallet. The core doesn't track a fixed token universe, so the
/// caller names the token; omitting it is a 400, not a silent empty map.
async fn handle_balances(
    req: &Request<Body>,
    orchestrator: &Orchestrator,
) -> anyhow::Result<Response<Body>> {
    let query = req.uri().query().unwrap_or("");
    let token_symbol = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(|s| s.to_string());

    let Some(token_symbol) = token_symbol else {
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": "missing required query parameter 'token'"}),
        ));
    };

    let token = TokenId::new(token_symbol);
    let balances = orchestrator.chain_balances(&token).await;
    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "balances": balances }),
    ))
}

async fn handle_execute(
    req: Request<Body>,
    orchestrator: &Orchestrator,
    token: &str,
) -> anyhow::Result<Response<Body>> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let presented = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header);
    if presented != token {
        return Ok(json_response(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"error": "invalid or missing API token"}),
        ));
    }

    let bytes = hyper::body::to_bytes(req.into_body()).await?;
    let parsed: Result<ExecuteRequest, _> = serde_json::from_slice(&bytes);
    let Ok(parsed) = parsed else {
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": "malformed request body, expected {id, kind, chain?}"}),
        ));
    };

    let id = OpportunityId::new(parsed.id);
    match orchestrator.force(id).await {
        Some(result) => Ok(json_response(StatusCode::OK, serde_json::to_value(&result)?)),
        None => Ok(json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({"error": "opportunity not found or already resolved"}),
        )),
    }
}

async fn handle_approve(
    req: Request<Body>,
    orchestrator: &Orchestrator,
) -> anyhow::Result<Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body()).await?;
    let parsed: Result<ApproveRequest, _> = serde_json::from_slice(&bytes);
    let Ok(parsed) = parsed else {
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": "malformed request body, expected {id}"}),
        ));
    };

    let id = OpportunityId::new(parsed.id);
    match orchestrator.force(id).await {
        Some(result) => Ok(json_response(StatusCode::OK, serde_json::to_value(&result)?)),
        None => Ok(json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({"error": "no held opportunity with that id"}),
        )),
    }
}

/// `POST /reset-daily` — manual daily-counter reset, for operators who need
/// to clear the day's volume before the UTC-midnight rollover runs
/// automatically (§4.4 `Reset()`). Same bearer auth as `/execute` since it
/// mutates risk state.
async fn handle_reset_daily(
    req: &Request<Body>,
    orchestrator: &Orchestrator,
    token: &str,
) -> anyhow::Result<Response<Body>> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let presented = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header);
    if presented != token {
        return Ok(json_response(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"error": "invalid or missing API token"}),
        ));
    }
    orchestrator.reset_daily_counters();
    Ok(json_response(StatusCode::OK, serde_json::json!({"reset": true})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_request_deserializes_minimal_body() {
        let body = r#"{"id": "opp-1"}"#;
        let parsed: ExecuteRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.id, "opp-1");
        assert!(parsed.kind.is_none());
        assert!(parsed.chain.is_none());
    }

    #[test]
    fn approve_request_deserializes() {
        let body = r#"{"id": "opp-2"}"#;
        let parsed: ApproveRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.id, "opp-2");
    }
}
