//! Loopback JSON API the GUI talks to.
//!
//! Every endpoint answers 200 with a `status` of `success` or `error`; the GUI
//! never has to interpret HTTP codes.

use std::{net::Ipv4Addr, path::PathBuf, sync::Arc};

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::{
    error::CutError,
    logging,
    model::{GatewayInfo, VictimDescriptor},
    service::CutService,
};

const LOG_TAIL_LINES: usize = 50;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<CutService>,
    pub log_file: Arc<PathBuf>,
}

pub fn router(state: ApiState) -> Router {
    return Router::new()
        .route("/status", get(status))
        .route("/gw", get(get_gateway))
        .route("/my/{iface}", get(get_my_info))
        .route("/scan/{ip}", get(scan_network))
        .route("/cut", post(cut_victim))
        .route("/resume", post(resume_victim))
        .route("/victims", get(list_victims))
        .route("/change-mac/{iface}", get(change_mac))
        .route("/protect", post(protect))
        .route("/unprotect", post(unprotect))
        .route("/protected", get(protected))
        .route("/log", get(get_log))
        .layer(CorsLayer::permissive())
        .with_state(state);
}

/// Runs `op` on the blocking pool; raw sockets and sysctls block.
async fn blocking<T, F>(state: &ApiState, op: F) -> Result<T, CutError>
where
    T: Send + 'static,
    F: FnOnce(&CutService) -> Result<T, CutError> + Send + 'static,
{
    let service = state.service.clone();
    return tokio::task::spawn_blocking(move || op(service.as_ref()))
        .await
        .map_err(|e| CutError::Io(anyhow::anyhow!("Worker task failed: {e}")))?;
}

fn success() -> Json<Value> {
    return Json(json!({ "status": "success" }));
}

fn failure(e: &CutError) -> Json<Value> {
    if e.is_user_error() {
        info!("{e}");
    } else {
        error!("{e:#}");
    }
    return Json(json!({ "status": "error", "msg": e.to_string() }));
}

async fn status() -> Json<Value> {
    return success();
}

async fn get_gateway(State(state): State<ApiState>) -> Json<Value> {
    return match blocking(&state, |service| service.gateway()).await {
        Ok(gw) => Json(json!({ "status": "success", "gw": gw })),
        Err(e) => failure(&e),
    };
}

async fn get_my_info(State(state): State<ApiState>, Path(iface): Path<String>) -> Json<Value> {
    return match blocking(&state, move |service| service.me(&iface)).await {
        Ok(my) => Json(json!({ "status": "success", "my": my })),
        Err(e) => failure(&e),
    };
}

async fn scan_network(State(state): State<ApiState>, Path(ip): Path<String>) -> Json<Value> {
    let ip: Ipv4Addr = match ip.parse() {
        Ok(ip) => ip,
        Err(_) => {
            return failure(&CutError::InvalidAddress {
                kind: "scan",
                value: ip,
            })
        }
    };
    return match blocking(&state, move |service| service.scan(ip)).await {
        Ok(hosts) => Json(json!({ "status": "success", "result": { "hosts": hosts } })),
        Err(e) => failure(&e),
    };
}

async fn cut_victim(
    State(state): State<ApiState>,
    Json(victim): Json<VictimDescriptor>,
) -> Json<Value> {
    return match blocking(&state, move |service| service.cut(victim)).await {
        Ok(()) => success(),
        Err(e) => failure(&e),
    };
}

async fn resume_victim(
    State(state): State<ApiState>,
    Json(victim): Json<VictimDescriptor>,
) -> Json<Value> {
    return match blocking(&state, move |service| service.resume(victim)).await {
        Ok(()) => success(),
        Err(e) => failure(&e),
    };
}

async fn list_victims(State(state): State<ApiState>) -> Json<Value> {
    return Json(json!({ "status": "success", "victims": state.service.victims() }));
}

async fn change_mac(State(state): State<ApiState>, Path(iface): Path<String>) -> Json<Value> {
    return match blocking(&state, move |service| service.change_mac(&iface)).await {
        Ok(mac) => Json(json!({
            "status": "success",
            "result": { "status": "success", "mac": mac.to_string() },
        })),
        Err(e) => {
            error!("Changing MAC failed: {e:#}");
            Json(json!({
                "status": "error",
                "msg": e.to_string(),
                "result": { "status": "failed" },
            }))
        }
    };
}

async fn protect(State(state): State<ApiState>, Json(gateway): Json<GatewayInfo>) -> Json<Value> {
    return match blocking(&state, move |service| service.protect(&gateway)).await {
        Ok(()) => success(),
        Err(e) => failure(&e),
    };
}

async fn unprotect(State(state): State<ApiState>) -> Json<Value> {
    return match blocking(&state, |service| service.unprotect()).await {
        Ok(()) => success(),
        Err(e) => failure(&e),
    };
}

async fn protected(State(state): State<ApiState>) -> Json<Value> {
    return Json(json!({ "status": "success", "protected": state.service.is_protected() }));
}

async fn get_log(State(state): State<ApiState>) -> Json<Value> {
    return match logging::tail(&state.log_file, LOG_TAIL_LINES) {
        Ok(Some(log)) => Json(json!({ "status": "success", "log": log })),
        Ok(None) => Json(json!({ "status": "error", "log": "Log file not found" })),
        Err(e) => {
            error!("Error reading log: {e:#}");
            Json(json!({ "status": "error", "log": e.to_string() }))
        }
    };
}
