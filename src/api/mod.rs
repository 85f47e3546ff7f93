// file: src/api/mod.rs
// version: 1.1.0
// guid: 4c7e1b9a-3d25-4f68-8e0a-b5d2c9f7a316

//! HTTP surface of the registrar
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/whoami` | POST | Hardware report in, worker archive out |
//! | `/clientcert` | GET | Operator certificate archive |
//! | `/nodes` | GET | Known node ids |
//! | `/nodes/:id/hardware` | GET | Last reported device tree |
//! | `/ca/expiry` | GET | CA certificate expiry |
//! | `/root-password` | POST | Change the controller root password |

use crate::bundle::{
    client_archive, worker_archive, ClientContext, WorkerContext, CLIENT_ARCHIVE_NAME,
    WORKER_ARCHIVE_NAME,
};
use crate::config::ShadowConfig;
use crate::error::ErrorKind;
use crate::hardware::{DeviceTree, HardwareReport};
use crate::lifecycle::NodeLifecycleManager;
use crate::store::ClusterRecord;
use crate::{shadow, RegistrarError, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Largest accepted hardware report
pub const MAX_REPORT_BYTES: usize = 1 << 20;

/// Cluster variable naming the controller's private interface
pub const VAR_PRIVATE_IF: &str = "CONTROLLER_PRIVATE_IF";
/// Cluster variable holding the Kubernetes API port
pub const VAR_API_PORT: &str = "KUBE_API_SECURE_PORT";

/// Shared state of every handler
pub struct ApiState {
    pub manager: Arc<NodeLifecycleManager>,
    pub shadow: ShadowConfig,
}

/// Error rendered as `{"error": "..."}` with a status derived from its kind
#[derive(Debug)]
pub struct ApiError(pub RegistrarError);

impl From<RegistrarError> for ApiError {
    fn from(err: RegistrarError) -> Self {
        Self(err)
    }
}

/// HTTP status for an error
pub fn status_for(err: &RegistrarError) -> StatusCode {
    if let RegistrarError::Parse(_) = err {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }
    match err.kind() {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Dependency => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeList {
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaExpiry {
    pub expiry_unix: i64,
}

#[derive(Debug, Deserialize)]
pub struct RootPasswordRequest {
    #[serde(default)]
    pub password: String,
}

/// Build the router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/whoami",
            post(whoami).layer(DefaultBodyLimit::max(MAX_REPORT_BYTES)),
        )
        .route("/clientcert", get(client_cert))
        .route("/nodes", get(list_nodes))
        .route("/nodes/:id/hardware", get(node_hardware))
        .route("/ca/expiry", get(ca_expiry))
        .route("/root-password", post(set_root_password))
        .with_state(state)
}

/// Serve until interrupted
pub async fn serve(addr: SocketAddr, state: Arc<ApiState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn whoami(State(state): State<Arc<ApiState>>, body: Bytes) -> std::result::Result<Response, ApiError> {
    let report = HardwareReport::from_json(&body)?;
    let registration = state.manager.submit_report(report).await?;

    let config = state.shadow.clone();
    let root_password_hash = run_blocking(move || {
        shadow::read_password_hash(&config.file, &config.root_account)
    })
    .await
    .map_err(|e| RegistrarError::config(format!("root password hash unavailable: {}", e)))?;

    let archive = worker_archive(&WorkerContext {
        cluster: state.manager.cluster(),
        node: &registration.node,
        root_password_hash,
    })?;
    Ok(archive_response(WORKER_ARCHIVE_NAME, archive))
}

async fn client_cert(
    State(state): State<Arc<ApiState>>,
    RawQuery(query): RawQuery,
) -> std::result::Result<Response, ApiError> {
    let (user, groups) = user_and_groups(query.as_deref().unwrap_or_default());
    let user = match user {
        Some(user) if !groups.is_empty() => user,
        _ => {
            return Err(RegistrarError::validation(
                "request should include 'user' and 'group' arguments",
            )
            .into())
        }
    };

    let identity = state.manager.issue_user_identity(&user, &groups).await?;
    let cluster = state.manager.cluster();
    let archive = client_archive(&ClientContext {
        identity: &identity,
        ca_bundle: &cluster.ca_bundle,
        cluster_name: &cluster.install_id,
        user: &user,
        server_url: api_server_url(cluster),
    })?;
    Ok(archive_response(CLIENT_ARCHIVE_NAME, archive))
}

async fn list_nodes(State(state): State<Arc<ApiState>>) -> Json<NodeList> {
    let nodes = state
        .manager
        .node_ids()
        .into_iter()
        .map(|id| NodeSummary { id })
        .collect();
    Json(NodeList { nodes })
}

async fn node_hardware(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<DeviceTree>, ApiError> {
    Ok(Json(state.manager.node_hardware(&id)?))
}

async fn ca_expiry(State(state): State<Arc<ApiState>>) -> std::result::Result<Json<CaExpiry>, ApiError> {
    let expiry = state.manager.ca_expiry()?;
    Ok(Json(CaExpiry {
        expiry_unix: expiry.timestamp(),
    }))
}

async fn set_root_password(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> std::result::Result<StatusCode, ApiError> {
    let request: RootPasswordRequest = serde_json::from_slice(&body)
        .map_err(|e| RegistrarError::parse(format!("invalid password request: {}", e)))?;

    let config = state.shadow.clone();
    run_blocking(move || {
        shadow::set_password(&config.file, &config.root_account, &request.password)
    })
    .await
    .map_err(|e| match e {
        RegistrarError::Validation(_) => e,
        other => RegistrarError::config(format!("cannot update root password: {}", other)),
    })?;

    Ok(StatusCode::NO_CONTENT)
}

fn archive_response(filename: &str, data: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    )
        .into_response()
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RegistrarError::Io(std::io::Error::other(e)))?
}

/// First `user` and every non-empty `group` of a query string
fn user_and_groups(query: &str) -> (Option<String>, Vec<String>) {
    let mut user = None;
    let mut groups = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "user" if user.is_none() => user = Some(value.into_owned()),
            "group" => groups.push(value.into_owned()),
            _ => {}
        }
    }
    (user, groups)
}

/// `https://<controller ip>:<api port>`, when the interface has an IPv4 address
fn api_server_url(cluster: &ClusterRecord) -> Option<String> {
    let interface = cluster.var(VAR_PRIVATE_IF);
    if interface.is_empty() {
        return None;
    }
    let ip = interface_ipv4(interface)?;
    Some(format!("https://{}:{}", ip, cluster.var(VAR_API_PORT)))
}

fn interface_ipv4(name: &str) -> Option<Ipv4Addr> {
    use network_interface::{NetworkInterface, NetworkInterfaceConfig};

    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!("Cannot list network interfaces: {}", e);
            return None;
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| iface.name == name)
        .flat_map(|iface| iface.addr)
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .last()
}
