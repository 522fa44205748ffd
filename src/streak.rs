//! Daily check-in streaks and the wellness score from the check-in questions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::StreakState;

/// Advances a streak for a check-in on `today`.
///
/// Checking in twice on the same day changes nothing; the day after the last
/// check-in extends the streak; anything else starts over at one.
pub fn check_in(state: StreakState, today: NaiveDate) -> StreakState {
    let current = match state.last_check_in {
        Some(last) if last == today => return state,
        Some(last) if (today - last).num_days() == 1 => state.current.saturating_add(1),
        _ => 1,
    };
    StreakState { current, last_check_in: Some(today) }
}

/// Mood, sleep, energy, stress, connection.
pub const CHECK_IN_QUESTIONS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WellnessError {
    #[error("expected {CHECK_IN_QUESTIONS} answers, got {0}")]
    AnswerCount(usize),

    #[error("answers must be 1-5, got {0}")]
    AnswerOutOfRange(u8),
}

/// Mean of the five 1-5 answers, to one decimal place.
pub fn wellness_score(answers: &[u8]) -> Result<f32, WellnessError> {
    if answers.len() != CHECK_IN_QUESTIONS {
        return Err(WellnessError::AnswerCount(answers.len()));
    }
    if let Some(bad) = answers.iter().copied().find(|a| !(1..=5).contains(a)) {
        return Err(WellnessError::AnswerOutOfRange(bad));
    }

    let total: u32 = answers.iter().map(|&a| u32::from(a)).sum();
    let mean = total as f32 / CHECK_IN_QUESTIONS as f32;
    Ok((mean * 10.0).round() / 10.0)
}

#[derive(Clone, Default)]
pub struct StreakBoard {
    streaks: Arc<RwLock<HashMap<Uuid, StreakState>>>,
}

impl StreakBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check_in(&self, user_id: Uuid, today: NaiveDate) -> StreakState {
        let mut streaks = self.streaks.write().await;
        let entry = streaks.entry(user_id).or_default();
        *entry = check_in(*entry, today);
        *entry
    }

    pub async fn get(&self, user_id: Uuid) -> StreakState {
        self.streaks.read().await.get(&user_id).copied().unwrap_or_default()
    }
}
