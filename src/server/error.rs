// Error handling utilities and response helpers

use crate::handler::Outcome;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Helper to create a JSON error response
pub fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, axum::Json(json!({"error": message})))
}

/// Helper for "not found" errors
pub fn not_found(message: &str) -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, message)
}

/// Helper for bad request errors
pub fn bad_request(message: &str) -> impl IntoResponse {
    json_error(StatusCode::BAD_REQUEST, message)
}

/// Map a handler outcome onto status, headers and JSON body
pub fn outcome_response(outcome: Outcome) -> Response {
    let status =
        StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::Json(outcome.body());

    match &outcome {
        Outcome::Created { location, .. } => match HeaderValue::from_str(location) {
            Ok(value) => (status, [(header::LOCATION, value)], body).into_response(),
            Err(_) => (status, body).into_response(),
        },
        _ => (status, body).into_response(),
    }
}
