use crate::record::{CorrectResponse, TrialRecord};
use serde::Serialize;

/// Steps of one trial, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Fixation,
    Placeholder,
    Response,
    Feedback,
    InterTrial,
}

impl TrialState {
    pub const ORDER: [TrialState; 5] = [
        TrialState::Fixation,
        TrialState::Placeholder,
        TrialState::Response,
        TrialState::Feedback,
        TrialState::InterTrial,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn next(&self) -> Option<Self> {
        Self::ORDER.get(self.index() + 1).copied()
    }
}

/// Recorded result of one response phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialOutcome {
    /// Position in completion order across the whole run.
    pub sequence_index: usize,
    pub is_practice: bool,
    pub left_image: String,
    pub right_image: String,
    pub correct_response: CorrectResponse,
    pub response: char,
    pub rt_ms: f64,
    pub correct_key: char,
    pub correct: bool,
    pub trial_type: Option<String>,
    pub category: Option<String>,
    pub pair: Option<String>,
    pub list_condition: Option<String>,
    pub trial_index: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl TrialOutcome {
    /// Scores `response` against `correct_key` and copies the record's
    /// metadata.
    pub fn score(
        record: &TrialRecord,
        correct_response: CorrectResponse,
        correct_key: char,
        response: char,
        rt_ms: f64,
        is_practice: bool,
        sequence_index: usize,
    ) -> Self {
        Self {
            sequence_index,
            is_practice,
            left_image: record.left_image.to_string(),
            right_image: record.right_image.to_string(),
            correct_response,
            response,
            rt_ms,
            correct_key,
            correct: response == correct_key,
            trial_type: record.trial_type.clone(),
            category: record.category.clone(),
            pair: record.pair.clone(),
            list_condition: record.condition.clone(),
            trial_index: record.trial_index.clone(),
            extra: record.extra.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_states_advance_to_iti() {
        let mut s = TrialState::Fixation;
        let mut n = 1;
        while let Some(next) = s.next() {
            s = next;
            n += 1;
        }
        assert_eq!(s, TrialState::InterTrial);
        assert_eq!(n, 5);
        assert_eq!(TrialState::Response.index(), 2);
    }

    #[test]
    fn score_compares_keys() {
        let rec = TrialRecord::new("a.png", "b.png", "different").with_category("dog");
        let hit = TrialOutcome::score(&rec, CorrectResponse::Different, '/', '/', 512.0, false, 0);
        assert!(hit.correct);
        assert_eq!(hit.category.as_deref(), Some("dog"));
        assert_eq!(hit.left_image, "a.png");

        let miss = TrialOutcome::score(&rec, CorrectResponse::Different, '/', 'z', 498.0, true, 1);
        assert!(!miss.correct);
        assert!(miss.is_practice);
    }
}
