//! HTTP surface of the scanner.
//!
//! Every response is a JSON [`Envelope`]. Expected failures are `ok: false`
//! with status 200; only unknown routes (404) and crashed scan tasks (500)
//! use other statuses.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::worker::{BlockScanner, ScanScheduler};

mod handlers;
mod response;

pub use response::{ApiError, Envelope, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<ScanScheduler>,
    pub scanner: Arc<BlockScanner>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/scan", post(handlers::scan_chain))
        .route("/api/scan/:block_number", post(handlers::scan_block))
        .route("/api/info", get(handlers::info))
        .fallback(handlers::not_found)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ScannerSettings;
    use crate::db::Database;
    use crate::subgraph::ChainHeadResolver;
    use crate::testing::FakeSubgraph;
    use crate::worker::{HttpDispatch, LocalDispatch, PageFetcher, ScanDispatch, ScanReport};

    const START: u64 = 5806610;

    fn app() -> (Router, Arc<FakeSubgraph>) {
        let db = Database::in_memory();
        let subgraph = Arc::new(FakeSubgraph::new(5806616));
        let settings = ScannerSettings::new(START);
        let fetcher = PageFetcher::new(subgraph.clone(), db.tokens.clone(), settings.page_size);
        let scanner = Arc::new(BlockScanner::new(db.scan.clone(), fetcher));
        let scheduler = Arc::new(ScanScheduler::new(
            db,
            ChainHeadResolver::new(subgraph.clone()),
            Arc::new(LocalDispatch::new(scanner.clone())),
            settings,
        ));
        (router(AppState { scheduler, scanner }), subgraph)
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_scan_block_returns_report() {
        let (app, subgraph) = app();
        subgraph.add_tokens(START, 37);

        let (status, body) = call(app, Method::POST, "/api/scan/5806610").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "ok": true, "value": { "done": true, "scanned": 37 } })
        );
    }

    #[tokio::test]
    async fn test_scan_block_rejects_invalid_number() {
        let (app, _) = app();
        let (status, body) = call(app, Method::POST, "/api/scan/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["message"], "Invalid block number: latest");
    }

    #[tokio::test]
    async fn test_scan_block_failure_is_ok_false() {
        let (app, subgraph) = app();
        subgraph.fail_block(START, "indexer timeout");
        let (status, body) = call(app, Method::POST, "/api/scan/5806610").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "ok": false, "error": { "message": "indexer timeout" } })
        );
    }

    #[tokio::test]
    async fn test_scan_chain_returns_outcomes() {
        let (app, _) = app();
        let (status, body) = call(app, Method::POST, "/api/scan").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let outcomes = body["value"].as_array().unwrap();
        assert_eq!(outcomes[0]["blockNumber"], START);
        assert_eq!(outcomes[0]["status"], "scanned");
        assert!(outcomes.iter().all(|o| o["blockNumber"].as_u64().unwrap() <= 5806615));
    }

    #[tokio::test]
    async fn test_scan_chain_head_failure() {
        let (app, subgraph) = app();
        subgraph.fail_head("indexer unreachable");
        let (status, body) = call(app, Method::POST, "/api/scan").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("indexer unreachable"));
    }

    #[tokio::test]
    async fn test_info() {
        let (app, _) = app();
        let (status, body) = call(app, Method::GET, "/api/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["value"]["cursor"], START - 1);
        assert_eq!(body["value"]["nextBlock"], START);
        assert_eq!(body["value"]["lastBlock"], 5806615);
        assert_eq!(body["value"]["poolSize"], 5);
    }

    #[tokio::test]
    async fn test_http_dispatch_against_served_router() {
        let (app, subgraph) = app();
        subgraph.add_tokens(START, 37);
        subgraph.fail_block(START + 1, "indexer timeout");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let dispatch = HttpDispatch::new(
            url::Url::parse(&format!("http://{}/", addr)).unwrap(),
            std::time::Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            dispatch.dispatch(START).await.unwrap(),
            ScanReport {
                done: true,
                scanned: 37
            }
        );
        match dispatch.dispatch(START + 1).await {
            Err(crate::error::ScanError::Dispatch {
                block_number,
                reason,
            }) => {
                assert_eq!(block_number, START + 1);
                assert_eq!(reason, "indexer timeout");
            },
            other => panic!("expected dispatch error, got {:?}", other),
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (app, _) = app();
        let (status, body) = call(app, Method::GET, "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({ "ok": false, "error": { "message": "Not Found" } })
        );
    }
}
