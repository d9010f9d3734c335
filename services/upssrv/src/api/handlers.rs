//! HTTP handlers

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::api::exposition::{encode_text, CONTENT_TYPE};
use crate::api::routes::AppState;
use errors::ServiceError;

/// Landing page pointing at the metrics path
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>UPS Exporter</title></head>\n\
         <body>\n\
         <h1>UPS Exporter</h1>\n\
         <p>Version {}</p>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        state.version, state.metrics_path
    ))
}

/// Run one scrape cycle and render it
pub async fn metrics(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let result = state.coordinator.scrape().await;
    let body = encode_text(state.coordinator.catalogue(), &result.measurements)
        .map_err(ServiceError::from)?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: String,
    pub targets: usize,
}

/// Liveness of the exporter itself; devices are not contacted
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "upssrv",
        version: state.version.clone(),
        targets: state.coordinator.targets().len(),
    })
}
