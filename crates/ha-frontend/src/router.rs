//! Static file router

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;

use crate::Frontend;

/// Cache-Control for static paths registered with cache headers
const CACHE_CONTROL_CACHED: &str = "public, max-age=2678400";

/// Cache-Control for static paths that must always be revalidated
const CACHE_CONTROL_NO_CACHE: &str = "no-cache";

impl Frontend {
    /// Router serving every registered static path
    ///
    /// Built from the paths registered at the time of the call.
    pub fn static_router(&self) -> Router {
        self.static_paths()
            .into_iter()
            .fold(Router::new(), |router, static_path| {
                let cache_control = if static_path.cache_headers {
                    CACHE_CONTROL_CACHED
                } else {
                    CACHE_CONTROL_NO_CACHE
                };
                router.nest_service(
                    &static_path.url_path,
                    SetResponseHeader::overriding(
                        ServeDir::new(&static_path.path),
                        header::CACHE_CONTROL,
                        HeaderValue::from_static(cache_control),
                    ),
                )
            })
    }

    /// Serve one request from the static paths registered right now
    ///
    /// Unlike a router built once at startup, this picks up paths
    /// registered by entries set up later.
    pub async fn serve(&self, request: Request) -> Response {
        match self.static_router().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::fs;
    use tempfile::TempDir;

    fn frontend_with_assets(cache_headers: bool) -> (TempDir, Frontend) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("panel.html"), "<html>panel</html>").unwrap();

        let frontend = Frontend::new();
        frontend
            .register_static_path("/emontx_config_static", dir.path(), cache_headers)
            .unwrap();
        (dir, frontend)
    }

    async fn get(router: Router, uri: &str) -> axum::response::Response {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_asset_without_caching() {
        let (_dir, frontend) = frontend_with_assets(false);

        let response = get(frontend.static_router(), "/emontx_config_static/panel.html").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"<html>panel</html>");
    }

    #[tokio::test]
    async fn test_cached_static_path() {
        let (_dir, frontend) = frontend_with_assets(true);

        let response = get(frontend.static_router(), "/emontx_config_static/panel.html").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            CACHE_CONTROL_CACHED
        );
    }

    #[tokio::test]
    async fn test_missing_asset() {
        let (_dir, frontend) = frontend_with_assets(false);

        let response = get(frontend.static_router(), "/emontx_config_static/missing.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_sees_late_registration() {
        let frontend = Frontend::new();
        let request = || {
            Request::builder()
                .uri("/emontx_config_static/panel.html")
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(frontend.serve(request()).await.status(), StatusCode::NOT_FOUND);

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("panel.html"), "<html></html>").unwrap();
        frontend
            .register_static_path("/emontx_config_static", dir.path(), false)
            .unwrap();

        assert_eq!(frontend.serve(request()).await.status(), StatusCode::OK);
    }
}
