//! HTTP surface of the embedded node.
//!
//! - `GET /` and `GET /_nodes/local` - node identity
//! - `GET /_cluster/health` - cluster health
//! - `GET /_cluster/stats` - cluster statistics
//!
//! Every route answers 503 while the node is not running.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::cluster::{ClusterHealth, ClusterState, ClusterStats, NodeInfo, NodePhase};

type SharedCluster = Arc<ClusterState>;

/// Error body for a node that cannot answer.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Rejection for requests reaching a node that is not running.
struct NotRunning(NodePhase);

impl IntoResponse for NotRunning {
    fn into_response(self) -> Response {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: format!("node is {}", self.0),
            }),
        )
            .into_response()
    }
}

fn ensure_running(cluster: &ClusterState) -> Result<(), NotRunning> {
    match cluster.phase() {
        NodePhase::Running => Ok(()),
        other => Err(NotRunning(other)),
    }
}

/// Build the node router over its cluster state.
pub fn router(cluster: SharedCluster) -> Router {
    Router::new()
        .route("/", get(node_info))
        .route("/_nodes/local", get(node_info))
        .route("/_cluster/health", get(cluster_health))
        .route("/_cluster/stats", get(cluster_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(cluster)
}

/// GET / - Identity of this node.
async fn node_info(State(cluster): State<SharedCluster>) -> Result<Json<NodeInfo>, NotRunning> {
    ensure_running(&cluster)?;
    Ok(Json(cluster.local().clone()))
}

/// GET /_cluster/health - Aggregate cluster health.
async fn cluster_health(
    State(cluster): State<SharedCluster>,
) -> Result<Json<ClusterHealth>, NotRunning> {
    ensure_running(&cluster)?;
    Ok(Json(cluster.health()))
}

/// GET /_cluster/stats - Node and index counts.
async fn cluster_stats(
    State(cluster): State<SharedCluster>,
) -> Result<Json<ClusterStats>, NotRunning> {
    ensure_running(&cluster)?;
    Ok(Json(cluster.stats()))
}
