use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::security::PolicyTable;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct LimitsSummary {
    pub tracked_origins: usize,
    pub tracked_entries: usize,
    pub policies: PolicyTable,
}

#[derive(Serialize)]
pub struct TokensSummary {
    pub live_tokens: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub async fn get_limits(State(state): State<AdminState>) -> Json<LimitsSummary> {
    let limiter = &state.guard.rate_limiter;
    Json(LimitsSummary {
        tracked_origins: limiter.origin_count(),
        tracked_entries: limiter.entry_count(),
        policies: (*limiter.policies()).clone(),
    })
}

pub async fn get_tokens(State(state): State<AdminState>) -> Json<TokensSummary> {
    Json(TokensSummary {
        live_tokens: state.guard.csrf.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::admin::{setup_admin_router, AdminState};
    use crate::config::GuardConfig;
    use crate::http::pipeline::GuardState;
    use crate::security::now_millis;

    fn state() -> AdminState {
        AdminState {
            guard: GuardState::from_config(&GuardConfig::default()).unwrap(),
            api_key: Arc::from("admin-key"),
            started_at: Instant::now(),
        }
    }

    fn get(path: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(path);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let router = setup_admin_router(state());

        let response = router.clone().oneshot(get("/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router.clone().oneshot(get("/admin/status", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router.oneshot(get("/admin/status", Some("admin-key"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_limits_and_tokens_reflect_stores() {
        let state = state();
        let now = now_millis();
        state.guard.rate_limiter.admit("203.0.113.9", "/api/login", now);
        state.guard.rate_limiter.admit("203.0.113.9", "/api/search", now);
        state.guard.csrf.issue("203.0.113.9", now);

        let router = setup_admin_router(state);

        let response = router.clone().oneshot(get("/admin/limits", Some("admin-key"))).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["tracked_origins"], 1);
        assert_eq!(json["tracked_entries"], 2);
        assert_eq!(json["policies"]["default"]["max_requests"], 60);

        let response = router.oneshot(get("/admin/tokens", Some("admin-key"))).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["live_tokens"], 1);
    }
}
