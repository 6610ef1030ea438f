// CORS middleware configuration for the relay server.
//
// The relay accepts cross-origin calls from exactly one origin: the web
// application it serves. `"*"` opens it to any origin for local testing.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build a [`CorsLayer`] for the configured web application origin.
///
/// - `"*"` allows any origin.
/// - Anything else allows exactly that origin.
/// - GET and POST only; preflight cached for 1 hour.
pub fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(std::time::Duration::from_secs(3600));

    match origin.trim() {
        "*" => base.allow_origin(AllowOrigin::any()),
        origin => match HeaderValue::from_str(origin) {
            Ok(value) => base.allow_origin(AllowOrigin::list([value])),
            Err(_) => {
                tracing::warn!(origin, "configured origin is not a valid header value");
                base
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    async fn ok_handler() -> impl IntoResponse {
        "ok"
    }

    fn test_app(origin: &str) -> Router {
        Router::new().route("/test", get(ok_handler)).layer(cors_layer(origin))
    }

    fn preflight(origin: &str, method: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/test")
            .header("origin", origin)
            .header("access-control-request-method", method)
            .body(Body::empty())
            .expect("preflight request should build")
    }

    #[tokio::test]
    async fn preflight_returns_cors_headers_for_configured_origin() {
        let response = test_app("https://app.pairsync.dev")
            .oneshot(preflight("https://app.pairsync.dev", "POST"))
            .await
            .expect("preflight should succeed");

        assert_eq!(
            response.headers().get("access-control-allow-origin").expect("allow-origin header"),
            "https://app.pairsync.dev"
        );
        assert_eq!(response.headers().get("access-control-max-age").expect("max-age"), "3600");
    }

    #[tokio::test]
    async fn preflight_rejects_other_origins() {
        let response = test_app("https://app.pairsync.dev")
            .oneshot(preflight("https://evil.example.com", "POST"))
            .await
            .expect("preflight should succeed");

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn simple_request_from_other_origin_gets_no_allow_origin() {
        let response = test_app("https://app.pairsync.dev")
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/test")
                    .header("origin", "https://evil.example.com")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn only_get_and_post_are_allowed() {
        let response = test_app("https://app.pairsync.dev")
            .oneshot(preflight("https://app.pairsync.dev", "DELETE"))
            .await
            .expect("preflight should succeed");

        let allowed = response
            .headers()
            .get("access-control-allow-methods")
            .expect("allow-methods header")
            .to_str()
            .expect("allow-methods should be ascii");
        assert!(allowed.contains("GET"));
        assert!(allowed.contains("POST"));
        assert!(!allowed.contains("DELETE"));
    }

    #[tokio::test]
    async fn wildcard_allows_any_origin() {
        let response = test_app("*")
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/test")
                    .header("origin", "https://anything.example.com")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.headers().get("access-control-allow-origin").expect("header"), "*");
    }
}
