use crate::rest::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Opaque session authorization: the bearer credential either matches the
/// configured token or it does not. Credential issuance lives elsewhere.
pub async fn authorize(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match bearer_token(&headers) {
        Some(token) if verify_token(token, &state.auth_token) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": "ACCESS_GRANTED" })),
        )
            .into_response(),
        _ => {
            debug!("authorization denied");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "Not authorized to access this route" })),
            )
                .into_response()
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header_value = headers.get(header::AUTHORIZATION)?;
    let auth_str = header_value.to_str().ok()?;
    auth_str.strip_prefix("Bearer ")
}

fn verify_token(presented: &str, expected: &str) -> bool {
    // An unset token denies everyone rather than matching the empty string.
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sesame"),
        );
        assert_eq!(bearer_token(&headers), Some("sesame"));
    }

    #[test]
    fn test_missing_or_malformed_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_verify_token() {
        assert!(verify_token("sesame", "sesame"));
        assert!(!verify_token("sesam", "sesame"));
        assert!(!verify_token("", "sesame"));
        assert!(!verify_token("", ""));
    }
}
