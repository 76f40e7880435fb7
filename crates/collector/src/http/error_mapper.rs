use axum::{Json, response::IntoResponse};
use common::api::ErrorResponse;

use crate::error::AppError;

pub(crate) fn into_response(err: AppError) -> axum::response::Response {
    let body = Json(ErrorResponse {
        error: err.message,
        code: err.code.to_string(),
    });
    let mut response = (err.status, body).into_response();
    if let Some(headers) = err.headers.as_deref() {
        for (name, value) in headers.iter() {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }
    response
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        into_response(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn into_response_exposes_code_and_message() {
        let response = into_response(
            AppError::unprocessable("invalid cluster_discovery payload: missing field `id`")
                .with_code("invalid_payload"),
        );
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(
            payload,
            json!({
                "error": "invalid cluster_discovery payload: missing field `id`",
                "code": "invalid_payload"
            })
        );
    }

    #[test]
    fn extra_headers_are_copied() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("1"));
        let response =
            into_response(AppError::service_unavailable("queue closed").with_headers(headers));
        assert_eq!(
            response.headers().get("retry-after"),
            Some(&HeaderValue::from_static("1"))
        );
    }
}
