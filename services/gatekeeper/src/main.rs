//! Reference gatekeeper HTTP service.
//!
//! Serves the registry API over an in-memory operation store:
//! `GET /version`, `GET /did/{did}` (optional `atTime` query), and
//! `POST /did` for create/update/deactivate operations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use mdip_core::{MdipDocument, Operation, OperationType, MDIP_VERSION};
use mdip_gatekeeper::{Gatekeeper, GatekeeperError, MemoryGatekeeper};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mdip-gatekeeper")]
#[command(about = "MDIP reference gatekeeper service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "4224")]
    port: u16,
}

type AppState = Arc<MemoryGatekeeper>;

fn status_for(error: &GatekeeperError) -> StatusCode {
    match error {
        GatekeeperError::NotFound(_) => StatusCode::NOT_FOUND,
        GatekeeperError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Protocol version.
async fn version() -> Json<u32> {
    Json(MDIP_VERSION)
}

#[derive(Deserialize)]
struct ResolveQuery {
    #[serde(rename = "atTime")]
    at_time: Option<String>,
}

/// Resolve a DID to its document, optionally as of a point in time.
async fn resolve_did(
    State(registry): State<AppState>,
    Path(did): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<MdipDocument>, (StatusCode, String)> {
    // URL decode the DID (colons may be encoded)
    let did = urlencoding::decode(&did)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
        .into_owned();

    let at = match query.at_time.as_deref() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid atTime: {}", e)))?,
        ),
        None => None,
    };

    let document = registry
        .resolve_did_at(&did, at)
        .await
        .map_err(|e| (status_for(&e), e.to_string()))?;

    Ok(Json(document))
}

/// Submit a signed operation.
async fn submit_operation(
    State(registry): State<AppState>,
    Json(operation): Json<Operation>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let (did, applied, status) = match operation.op {
        OperationType::Create => {
            let did = registry
                .create_did(&operation)
                .await
                .map_err(|e| (status_for(&e), e.to_string()))?;
            (did, true, StatusCode::CREATED)
        }
        OperationType::Update => {
            let did = operation.did.clone().unwrap_or_default();
            let applied = registry
                .update_did(&operation)
                .await
                .map_err(|e| (status_for(&e), e.to_string()))?;
            (did, applied, StatusCode::OK)
        }
        OperationType::Deactivate => {
            let did = operation.did.clone().unwrap_or_default();
            let applied = registry
                .delete_did(&operation)
                .await
                .map_err(|e| (status_for(&e), e.to_string()))?;
            (did, applied, StatusCode::OK)
        }
    };

    info!(%did, op = ?operation.op, applied, "operation accepted");

    Ok((
        status,
        Json(serde_json::json!({
            "did": did,
            "applied": applied,
        })),
    ))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let registry = Arc::new(MemoryGatekeeper::new());

    let app = Router::new()
        .route("/version", get(version))
        .route("/did", post(submit_operation))
        .route("/did/{did}", get(resolve_did))
        .with_state(registry);

    let addr = format!("0.0.0.0:{}", args.port);
    println!("MDIP Gatekeeper Service");
    println!("  Listening on: http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  GET  /version     - Protocol version");
    println!("  POST /did         - Submit a signed operation");
    println!("  GET  /did/{{did}}   - Resolve a DID (optional ?atTime=...)");
    println!();

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
