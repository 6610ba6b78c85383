//! HTTP/JSON transport for [`TrafficRouterPlugin`]
//!
//! One POST endpoint per plugin operation plus Kubernetes probes:
//!
//! | Method | Path                        | Body                          |
//! |--------|-----------------------------|-------------------------------|
//! | POST   | `/v1/set-weight`            | [`SetWeightRequest`]          |
//! | POST   | `/v1/verify-weight`         | [`SetWeightRequest`]          |
//! | POST   | `/v1/update-hash`           | [`UpdateHashRequest`]         |
//! | POST   | `/v1/set-header-route`      | [`SetHeaderRouteRequest`]     |
//! | POST   | `/v1/set-mirror-route`      | [`SetMirrorRouteRequest`]     |
//! | POST   | `/v1/remove-managed-routes` | [`RemoveManagedRoutesRequest`]|
//! | GET    | `/v1/type`                  | none                          |
//! | GET    | `/healthz`, `/readyz`       | none                          |
//!
//! `/healthz` only reports that the process is serving. `/readyz` runs the
//! plugin's `init`, so it fails with 503 while the store is unreachable.
//!
//! Plugin failures are still HTTP 200: the outcome lives in `errorString`.
//! Only transport problems (bad JSON, unknown path) use other status codes.

use crate::error::{Result, RouterError};
use crate::model::{Rollout, SetHeaderRoute, SetMirrorRoute, WeightDestination};
use crate::plugin::{RpcError, RpcVerified, TrafficRouterPlugin};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `/v1/set-weight` and `/v1/verify-weight`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWeightRequest {
    #[serde(default)]
    pub rollout: Option<Rollout>,
    #[serde(default)]
    pub desired_weight: i32,
    #[serde(default)]
    pub additional_destinations: Vec<WeightDestination>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHashRequest {
    #[serde(default)]
    pub rollout: Option<Rollout>,
    #[serde(default)]
    pub canary_hash: String,
    #[serde(default)]
    pub stable_hash: String,
    #[serde(default)]
    pub additional_destinations: Vec<WeightDestination>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetHeaderRouteRequest {
    #[serde(default)]
    pub rollout: Option<Rollout>,
    #[serde(default)]
    pub header_routing: Option<SetHeaderRoute>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMirrorRouteRequest {
    #[serde(default)]
    pub rollout: Option<Rollout>,
    #[serde(default)]
    pub mirror_route: Option<SetMirrorRoute>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveManagedRoutesRequest {
    #[serde(default)]
    pub rollout: Option<Rollout>,
}

/// Response of `/v1/verify-weight`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyWeightResponse {
    pub verified: RpcVerified,
    #[serde(flatten)]
    pub error: RpcError,
}

/// Response of `/v1/type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeResponse {
    #[serde(rename = "type")]
    pub type_name: String,
}

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_JSON: &str = "application/json";

/// Status, content type and body produced for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl PluginResponse {
    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_PLAIN,
            body: body.into(),
        }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status,
                content_type: APPLICATION_JSON,
                body,
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize plugin response");
                Self::text(500, format!("failed to serialize response: {}", e))
            }
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &RpcError::new(message))
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Route one request to the plugin. Transport-independent so it can be
/// exercised without a socket.
pub async fn dispatch<P>(plugin: &P, method: &Method, path: &str, body: &[u8]) -> PluginResponse
where
    P: TrafficRouterPlugin + ?Sized,
{
    match (method, path) {
        (&Method::GET, "/healthz") => PluginResponse::text(200, "ok"),
        (&Method::GET, "/readyz") => {
            let init = plugin.init().await;
            if init.is_ok() {
                PluginResponse::text(200, "ok")
            } else {
                PluginResponse::json(503, &init)
            }
        }
        (&Method::GET, "/v1/type") => PluginResponse::json(
            200,
            &TypeResponse {
                type_name: plugin.type_name().to_string(),
            },
        ),
        (&Method::POST, "/v1/set-weight") => match parse::<SetWeightRequest>(body) {
            Ok(req) => {
                let result = plugin
                    .set_weight(
                        req.rollout.as_ref(),
                        req.desired_weight,
                        &req.additional_destinations,
                    )
                    .await;
                PluginResponse::json(200, &result)
            }
            Err(e) => PluginResponse::error(400, e.to_string()),
        },
        (&Method::POST, "/v1/verify-weight") => match parse::<SetWeightRequest>(body) {
            Ok(req) => {
                let (verified, error) = plugin
                    .verify_weight(
                        req.rollout.as_ref(),
                        req.desired_weight,
                        &req.additional_destinations,
                    )
                    .await;
                PluginResponse::json(200, &VerifyWeightResponse { verified, error })
            }
            Err(e) => PluginResponse::error(400, e.to_string()),
        },
        (&Method::POST, "/v1/update-hash") => match parse::<UpdateHashRequest>(body) {
            Ok(req) => {
                let result = plugin
                    .update_hash(
                        req.rollout.as_ref(),
                        &req.canary_hash,
                        &req.stable_hash,
                        &req.additional_destinations,
                    )
                    .await;
                PluginResponse::json(200, &result)
            }
            Err(e) => PluginResponse::error(400, e.to_string()),
        },
        (&Method::POST, "/v1/set-header-route") => match parse::<SetHeaderRouteRequest>(body) {
            Ok(req) => {
                let result = plugin
                    .set_header_route(req.rollout.as_ref(), req.header_routing.as_ref())
                    .await;
                PluginResponse::json(200, &result)
            }
            Err(e) => PluginResponse::error(400, e.to_string()),
        },
        (&Method::POST, "/v1/set-mirror-route") => match parse::<SetMirrorRouteRequest>(body) {
            Ok(req) => {
                let result = plugin
                    .set_mirror_route(req.rollout.as_ref(), req.mirror_route.as_ref())
                    .await;
                PluginResponse::json(200, &result)
            }
            Err(e) => PluginResponse::error(400, e.to_string()),
        },
        (&Method::POST, "/v1/remove-managed-routes") => {
            match parse::<RemoveManagedRoutesRequest>(body) {
                Ok(req) => {
                    let result = plugin.remove_managed_routes(req.rollout.as_ref()).await;
                    PluginResponse::json(200, &result)
                }
                Err(e) => PluginResponse::error(400, e.to_string()),
            }
        }
        (_, p) if p.starts_with("/v1/") || p == "/healthz" || p == "/readyz" => {
            PluginResponse::error(405, format!("method {} not allowed on {}", method, p))
        }
        (_, p) => PluginResponse::error(404, format!("unknown path {}", p)),
    }
}

fn parse<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| RouterError::Decode(format!("invalid request body: {}", e)))
}

// ---------------------------------------------------------------------------
// hyper glue
// ---------------------------------------------------------------------------

async fn handle_request<P>(
    req: Request<Incoming>,
    plugin: Arc<P>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error>
where
    P: TrafficRouterPlugin + ?Sized,
{
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let response = dispatch(plugin.as_ref(), &parts.method, parts.uri.path(), &body).await;
    tracing::debug!(
        method = %parts.method,
        path = parts.uri.path(),
        status = response.status,
        "plugin request handled"
    );

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http_response = Response::new(Full::new(Bytes::from(response.body)));
    *http_response.status_mut() = status;
    http_response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(response.content_type),
    );
    Ok(http_response)
}

/// Bind `addr` and serve the plugin until the task is dropped
pub async fn start_plugin_server<P>(addr: SocketAddr, plugin: Arc<P>) -> Result<()>
where
    P: TrafficRouterPlugin + ?Sized + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RouterError::Other(format!("Failed to bind {}: {}", addr, e)))?;
    serve(listener, plugin).await
}

/// Serve the plugin on an already-bound listener
pub async fn serve<P>(listener: TcpListener, plugin: Arc<P>) -> Result<()>
where
    P: TrafficRouterPlugin + ?Sized + 'static,
{
    let local = listener.local_addr()?;
    tracing::info!(address = %local, plugin = plugin.type_name(), "Plugin server listening");

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let plugin = plugin.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(|req| handle_request(req, plugin.clone())))
                .await
            {
                tracing::debug!(remote = %remote_addr, error = %e, "plugin connection error");
            }
        });
    }
}
