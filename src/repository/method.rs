use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExperimentId, MethodId};
use crate::MethodDraft;

const MIN_TEXT_LEN: usize = 3;

/// A stored method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Method {
    pub id: MethodId,
    pub creator: String,
    pub name: String,
    pub application_rate: f64,
    pub created_at: DateTime<Utc>,
    pub experiment_ids: Vec<ExperimentId>,
}

/// New creator and name for an existing method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodChanges {
    pub creator: String,
    pub name: String,
}

impl Method {
    /// Build an unsaved method (id 0) from a draft, stamped with the current time.
    pub(crate) fn from_draft(draft: MethodDraft) -> Self {
        Self {
            id: 0,
            creator: draft.creator,
            name: draft.name,
            application_rate: draft.application_rate,
            created_at: Utc::now(),
            experiment_ids: Vec::new(),
        }
    }

    /// Every rule this method breaks, as human-readable messages.
    pub(crate) fn violations(&self) -> Vec<String> {
        let mut errors = text_violations("Creator", &self.creator);
        errors.extend(text_violations("Name", &self.name));

        // Written so that NaN fails both bounds.
        if !(self.application_rate > 0.0) {
            errors.push(format!(
                "'Application Rate' must be greater than '0' (was {}).",
                self.application_rate
            ));
        } else if !(self.application_rate <= 1.0) {
            errors.push(format!(
                "'Application Rate' must be less than or equal to '1' (was {}).",
                self.application_rate
            ));
        }

        if self.created_at.date_naive() < Utc::now().date_naive() {
            errors.push("'Creation Date' must not be in the past.".to_string());
        }
        errors
    }

    /// Join an experiment. Repeated joins have no effect.
    pub(crate) fn add_experiment(&mut self, experiment_id: ExperimentId) {
        if !self.experiment_ids.contains(&experiment_id) {
            self.experiment_ids.push(experiment_id);
        }
    }

    pub(crate) fn remove_experiment(&mut self, experiment_id: ExperimentId) {
        self.experiment_ids.retain(|id| *id != experiment_id);
    }
}

impl MethodChanges {
    pub(crate) fn violations(&self) -> Vec<String> {
        let mut errors = text_violations("Creator", &self.creator);
        errors.extend(text_violations("Name", &self.name));
        errors
    }
}

fn text_violations(field: &str, value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        vec![format!("'{field}' must not be empty.")]
    } else if value.chars().count() < MIN_TEXT_LEN {
        vec![format!(
            "The length of '{field}' must be at least {MIN_TEXT_LEN} characters."
        )]
    } else {
        Vec::new()
    }
}
