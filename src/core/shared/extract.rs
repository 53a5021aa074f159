//! Body and query extractors whose rejections render as [`ApiError`].

use axum::extract::{FromRequest, FromRequestParts};

use super::error::ApiError;

#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use tower::ServiceExt;

    use crate::core::shared::IdeaStatus;

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        title: String,
        #[allow(dead_code)]
        status: Option<IdeaStatus>,
    }

    #[derive(Debug, Deserialize)]
    struct Filter {
        #[allow(dead_code)]
        limit: Option<i64>,
    }

    fn app() -> Router {
        Router::new()
            .route("/body", post(|ApiJson(_): ApiJson<Payload>| async { StatusCode::OK }))
            .route("/query", get(|ApiQuery(_): ApiQuery<Filter>| async { StatusCode::OK }))
    }

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/body")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn test_unknown_enum_value_is_field_error() {
        let (status, body) = send(post_json(r#"{"title": "Bus", "status": "pending"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["fields"]["status"].is_array());
    }

    #[tokio::test]
    async fn test_missing_field_is_reported_by_name() {
        let (status, body) = send(post_json(r#"{"status": "draft"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"]["title"][0], "This field is required.");
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let (status, body) = send(post_json("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["fields"]["non_field_errors"].is_array());
    }

    #[tokio::test]
    async fn test_bad_query_is_validation_error() {
        let request = Request::builder()
            .uri("/query?limit=many")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }
}
