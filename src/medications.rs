//! Per-user medication reminders, kept in memory for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{MedicationInput, MedicationRule};
use crate::schedule::{self, RuleError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    #[error(transparent)]
    Invalid(#[from] RuleError),

    #[error("no medication {0}")]
    NotFound(Uuid),
}

/// Reminder lists keyed by user. Cloning shares the same lists.
#[derive(Clone, Default)]
pub struct MedicationBoard {
    lists: Arc<RwLock<HashMap<Uuid, Vec<MedicationRule>>>>,
}

impl MedicationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, input: MedicationInput, now: DateTime<Utc>) -> Result<MedicationRule, BoardError> {
        let rule = rule_from_input(Uuid::new_v4(), &input, now);
        schedule::validate(&rule)?;

        self.lists
            .write()
            .await
            .entry(input.user_id)
            .or_default()
            .push(rule.clone());
        Ok(rule)
    }

    /// Replaces the rule's fields in place; id, creation time and list
    /// position are kept.
    pub async fn update(&self, id: Uuid, input: MedicationInput) -> Result<MedicationRule, BoardError> {
        let mut lists = self.lists.write().await;
        let slot = lists
            .get_mut(&input.user_id)
            .and_then(|rules| rules.iter_mut().find(|r| r.id == id))
            .ok_or(BoardError::NotFound(id))?;

        let updated = rule_from_input(id, &input, slot.created_at);
        schedule::validate(&updated)?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub async fn remove(&self, user_id: Uuid, id: Uuid) -> Result<(), BoardError> {
        let mut lists = self.lists.write().await;
        let rules = lists.get_mut(&user_id).ok_or(BoardError::NotFound(id))?;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Err(BoardError::NotFound(id));
        }
        Ok(())
    }

    pub async fn list(&self, user_id: Uuid) -> Vec<MedicationRule> {
        self.lists
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn rule_from_input(id: Uuid, input: &MedicationInput, created_at: DateTime<Utc>) -> MedicationRule {
    MedicationRule {
        id,
        name: input.name.trim().to_string(),
        time_of_day: input.time_of_day,
        frequency: input.frequency,
        day_of_week: input.day_of_week,
        day_of_month: input.day_of_month,
        notifications_enabled: input.notifications_enabled,
        created_at,
    }
}
