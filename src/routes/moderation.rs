use axum::{
    Router,
    routing::post,
    extract::State,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use crate::moderation::{self, Verdict};
use crate::store::PgMessageStore;

#[derive(Deserialize)]
struct ModerationRequest {
    message: String,
    #[serde(default, alias = "messageId")]
    message_id: Option<Uuid>,
}

pub fn routes(store: PgMessageStore) -> Router {
    Router::new()
        .route("/moderate", post(moderate))
        .with_state(store)
}

async fn moderate(
    State(store): State<PgMessageStore>,
    Json(body): Json<ModerationRequest>,
) -> Json<Verdict> {
    let verdict = moderation::screen(&body.message);

    if let (Some(reason), Some(id)) = (verdict.reason, body.message_id) {
        match store.flag(id, reason, Utc::now()).await {
            Ok(0) => tracing::info!(message_id = %id, "ℹ️ flagged message not found"),
            Ok(_) => tracing::info!(message_id = %id, "🚩 message flagged"),
            Err(e) => tracing::error!(message_id = %id, "❌ Error flagging message: {}", e),
        }
    }

    Json(verdict)
}
