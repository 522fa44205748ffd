use axum::{
    Router,
    routing::{get, post},
    extract::{State, Query},
    Json,
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::models::StreakState;
use crate::streak::{self, StreakBoard};

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct CheckIn {
    user_id: Uuid,
    #[serde(default)]
    answers: Option<Vec<u8>>,
}

#[derive(Serialize)]
struct CheckInResult {
    #[serde(flatten)]
    streak: StreakState,
    #[serde(skip_serializing_if = "Option::is_none")]
    wellness_score: Option<f32>,
}

pub fn routes(board: StreakBoard) -> Router {
    Router::new()
        .route("/streak", get(get_streak))
        .route("/streak/check-in", post(check_in))
        .with_state(board)
}

async fn get_streak(
    State(board): State<StreakBoard>,
    Query(query): Query<UserQuery>,
) -> Json<StreakState> {
    Json(board.get(query.user_id).await)
}

async fn check_in(
    State(board): State<StreakBoard>,
    Json(body): Json<CheckIn>,
) -> Result<Json<CheckInResult>, (StatusCode, String)> {
    let wellness_score = body
        .answers
        .as_deref()
        .map(streak::wellness_score)
        .transpose()
        .map_err(|e| {
            tracing::info!("⚠️ check-in rejected: {}", e);
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        })?;

    let today = Utc::now().date_naive();
    let state = board.check_in(body.user_id, today).await;
    tracing::info!(user_id = %body.user_id, streak = state.current, ?wellness_score, "🔥 daily check-in");
    Ok(Json(CheckInResult { streak: state, wellness_score }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn check_in_request(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/streak/check-in")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn check_in_with_answers_reports_score() {
        let user = Uuid::new_v4();
        let (status, body) = send(
            routes(StreakBoard::new()),
            check_in_request(json!({ "user_id": user, "answers": [4, 4, 3, 5, 4] })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current"], 1);
        assert!((body["wellness_score"].as_f64().unwrap() - 4.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn plain_check_in_has_no_score() {
        let (status, body) = send(
            routes(StreakBoard::new()),
            check_in_request(json!({ "user_id": Uuid::new_v4() })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("wellness_score").is_none());
    }

    #[tokio::test]
    async fn bad_answers_do_not_advance_streak() {
        let board = StreakBoard::new();
        let user = Uuid::new_v4();

        let (status, _) = send(
            routes(board.clone()),
            check_in_request(json!({ "user_id": user, "answers": [4, 9, 3, 5, 4] })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(board.get(user).await, StreakState::default());
    }
}
