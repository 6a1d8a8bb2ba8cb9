use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len(),
        "present": state.channel.roster_len(),
    }))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::db::profiles::MemoryStore;

    #[tokio::test]
    async fn health_reports_counts() {
        let config = Config {
            salt: "test-salt".to_string(),
            port: 0,
            users_file: PathBuf::from("unused.json"),
            motd: "tinympp".to_string(),
            idle_timeout: None,
        };
        let state = AppState::new(config, Arc::new(MemoryStore::new()));
        state.sessions.try_register("abc", "ses_1").unwrap();

        let app = router().with_state(state);
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 1);
        assert_eq!(body["present"], 0);
    }
}
