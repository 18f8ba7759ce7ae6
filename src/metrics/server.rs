use std::{sync::Arc, time::Duration};

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use http::{StatusCode, header::CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{metrics::Metrics, prelude::*};

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .with_state(metrics)
        .layer((TraceLayer::new_for_http(), TimeoutLayer::new(Duration::from_secs(10))))
}

/// Serve the metrics until the task gets aborted.
pub async fn serve(listener: TcpListener, metrics: Arc<Metrics>) -> Result {
    info!(address = ?listener.local_addr()?, "serving the metrics…");
    axum::serve(listener, router(metrics)).await.context("the metrics server has failed")
}

#[instrument(skip_all, level = Level::DEBUG)]
async fn get_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body)),
        Err(error) => {
            error!("failed to encode the metrics: {error:#}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
