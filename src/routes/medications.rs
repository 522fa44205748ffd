use axum::{
    Router,
    routing::{get, put},
    extract::{State, Query, Path},
    Json,
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;
use crate::medications::{BoardError, MedicationBoard};
use crate::models::{MedicationInput, MedicationRule};
use crate::schedule;

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct DueQuery {
    user_id: Uuid,
    date: NaiveDate,
}

pub fn routes(board: MedicationBoard) -> Router {
    Router::new()
        .route("/medications", get(list_medications).post(add_medication))
        .route("/medications/due", get(medications_due))
        .route("/medications/:id", put(update_medication).delete(delete_medication))
        .with_state(board)
}

fn reject(e: BoardError) -> (StatusCode, String) {
    let status = match e {
        BoardError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BoardError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    tracing::info!("⚠️ medication rejected: {}", e);
    (status, e.to_string())
}

async fn add_medication(
    State(board): State<MedicationBoard>,
    Json(body): Json<MedicationInput>,
) -> Result<(StatusCode, Json<MedicationRule>), (StatusCode, String)> {
    let rule = board.add(body, Utc::now()).await.map_err(reject)?;
    tracing::info!(rule_id = %rule.id, frequency = %rule.frequency, "💊 medication reminder added");
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_medication(
    State(board): State<MedicationBoard>,
    Path(id): Path<Uuid>,
    Json(body): Json<MedicationInput>,
) -> Result<Json<MedicationRule>, (StatusCode, String)> {
    board.update(id, body).await.map(Json).map_err(reject)
}

async fn delete_medication(
    State(board): State<MedicationBoard>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, (StatusCode, String)> {
    board.remove(query.user_id, id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_medications(
    State(board): State<MedicationBoard>,
    Query(query): Query<UserQuery>,
) -> Json<Vec<MedicationRule>> {
    Json(board.list(query.user_id).await)
}

async fn medications_due(
    State(board): State<MedicationBoard>,
    Query(query): Query<DueQuery>,
) -> Json<Vec<MedicationRule>> {
    let rules = board.list(query.user_id).await;
    let due = schedule::medications_due_on(&rules, query.date)
        .into_iter()
        .cloned()
        .collect();
    Json(due)
}
