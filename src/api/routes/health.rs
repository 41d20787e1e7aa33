use axum::{response::IntoResponse, Json};

/// GET /health
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "megabolsa-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{router, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = router(None, None);
        let (status, body) = send(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "megabolsa-api");
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let (app, _) = router(None, None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert!(headers.contains_key("x-correlation-id"));
    }
}
