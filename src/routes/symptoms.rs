use axum::{
    Router,
    routing::{get, post, delete},
    extract::{State, Query, Path},
    Json,
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::error::ErrorKind;
use uuid::Uuid;
use std::collections::BTreeMap;
use crate::models::{ NewSymptom, SymptomRecord, SymptomsByDate };
use crate::store::PgSymptomStore;

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

pub fn routes(store: PgSymptomStore) -> Router {
    Router::new()
        .route("/symptom", post(log_symptom))
        .route("/symptom/:id", delete(delete_symptom))
        .route("/symptoms", get(get_symptoms_grouped))
        .route("/symptom/all", get(get_symptoms_flat))
        .with_state(store)
}

fn has_content(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

async fn log_symptom(
    State(store): State<PgSymptomStore>,
    Json(body): Json<NewSymptom>,
) -> Result<(StatusCode, Json<SymptomRecord>), (StatusCode, String)> {
    if ![&body.text, &body.voice_transcript, &body.image_url].into_iter().any(has_content) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Provide text, a voice transcript or an image".into(),
        ));
    }

    let record = store.insert(&body).await.map_err(|e| {
        if let Some(db_err) = e.as_database_error() {
            tracing::error!("❌ DB insert failed: {}", db_err.message());

            if let Some(code) = db_err.code() {
                tracing::info!("ℹ️ SQLSTATE code: {}", code);
            }
        } else {
            tracing::error!("❌ Unknown DB error: {}", e);
        }

        (insert_failure_status(&e), "Could not save symptom".into())
    })?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// Constraint violations are the caller's fault; anything else (pool
/// timeouts, dropped connections) is ours.
fn insert_failure_status(e: &sqlx::Error) -> StatusCode {
    match e.as_database_error().map(|db_err| db_err.kind()) {
        Some(
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation,
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn delete_symptom(
    State(store): State<PgSymptomStore>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete(query.user_id, id).await {
        Ok(n) if n > 0 => Ok(StatusCode::NO_CONTENT),
        Ok(_) => Err((StatusCode::NOT_FOUND, "No symptom found".into())),
        Err(e) => {
            tracing::error!("❌ DB error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "DB error".into()))
        }
    }
}

async fn get_symptoms_flat(
    State(store): State<PgSymptomStore>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<SymptomRecord>>, StatusCode> {
    let records = store.list_all(query.user_id).await.map_err(|e| {
        tracing::error!("❌ Failed to fetch flat symptoms: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(records))
}

async fn get_symptoms_grouped(
    State(store): State<PgSymptomStore>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<SymptomsByDate>>, StatusCode> {
    let records = store.list_all(query.user_id).await.map_err(|e| {
        tracing::error!("❌ Failed to fetch symptoms: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(group_by_day(records)))
}

/// Newest day first; entries keep their incoming order within a day.
fn group_by_day(records: Vec<SymptomRecord>) -> Vec<SymptomsByDate> {
    let mut map = BTreeMap::<NaiveDate, Vec<SymptomRecord>>::new();
    for record in records {
        map.entry(record.created_at.date_naive())
            .or_default()
            .push(record);
    }

    map.into_iter()
        .rev()
        .map(|(logged_on, entries)| SymptomsByDate { logged_on, entries })
        .collect()
}
