use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use rpcman_loadbalance::RpcEndpointManager;
use serde_json::json;
use std::sync::Arc;

/// 诊断服务状态
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RpcEndpointManager>,
}

/// 创建诊断路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn index() -> &'static str {
    "rpcman - RPC endpoint manager"
}

/// 至少一个端点健康时返回200，否则503
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.manager.get_stats();
    let status = if stats.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if stats.is_healthy() { "healthy" } else { "unhealthy" },
            "timestamp": stats.timestamp,
            "running": stats.running,
            "current_endpoint": stats.current_endpoint,
            "total_endpoints": stats.total_endpoints,
            "healthy_endpoints": stats.healthy_endpoints,
        })),
    )
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.get_stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_manager, FakeFactory};
    use axum_test::TestServer;

    fn create_test_server(failing: &[&str]) -> (TestServer, Arc<RpcEndpointManager>) {
        let manager = Arc::new(create_test_manager(FakeFactory::new(failing)));
        let app = create_app(AppState {
            manager: manager.clone(),
        });
        (TestServer::new(app).unwrap(), manager)
    }

    #[tokio::test]
    async fn test_index_endpoint() {
        let (server, _manager) = create_test_server(&[]);

        let response = server.get("/").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.text(), "rpcman - RPC endpoint manager");
    }

    #[tokio::test]
    async fn test_health_ok_when_any_endpoint_healthy() {
        let (server, manager) = create_test_server(&["primary"]);
        manager.check_now().await;
        manager.check_now().await;
        manager.check_now().await;

        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["healthy_endpoints"], 1);
    }

    #[tokio::test]
    async fn test_health_unavailable_when_all_endpoints_down() {
        let (server, manager) = create_test_server(&["primary", "backup"]);
        for _ in 0..3 {
            manager.check_now().await;
        }

        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (server, manager) = create_test_server(&[]);
        let _client = manager.get_read_client().unwrap();

        let response = server.get("/stats").await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let body: serde_json::Value = response.json();
        assert_eq!(body["chain_id"], 1);
        assert_eq!(body["current_endpoint"], "primary");
        assert_eq!(body["endpoints"].as_array().unwrap().len(), 2);
        assert_eq!(body["pool"]["size"], 1);
    }
}
