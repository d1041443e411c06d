use crate::Atom;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The answer a trial expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectResponse {
    Same,
    Different,
}

impl CorrectResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectResponse::Same => "same",
            CorrectResponse::Different => "different",
        }
    }
}

impl fmt::Display for CorrectResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `correct_response` value that is neither `same` nor `different`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized correct_response {0:?} (expected \"same\" or \"different\")")]
pub struct UnknownResponse(pub String);

impl FromStr for CorrectResponse {
    type Err = UnknownResponse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "same" => Ok(CorrectResponse::Same),
            "different" => Ok(CorrectResponse::Different),
            other => Err(UnknownResponse(other.to_string())),
        }
    }
}

/// One row of a condition's trial list.
///
/// `correct_response` stays as loaded; it is validated when the trial's
/// sequence is built so a bad row fails timeline construction rather than
/// the load.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub left_image: Atom,
    pub right_image: Atom,
    pub correct_response: String,
    pub trial_type: Option<String>,
    pub category: Option<String>,
    pub pair: Option<String>,
    pub condition: Option<String>,
    pub trial_index: Option<String>,
    /// Remaining columns in header order, e.g. `randomize_lr`.
    pub extra: Vec<(String, String)>,
}

impl TrialRecord {
    pub fn new(
        left_image: impl Into<Atom>,
        right_image: impl Into<Atom>,
        correct_response: impl Into<String>,
    ) -> Self {
        Self {
            left_image: left_image.into(),
            right_image: right_image.into(),
            correct_response: correct_response.into(),
            trial_type: None,
            category: None,
            pair: None,
            condition: None,
            trial_index: None,
            extra: Vec::new(),
        }
    }

    pub fn with_trial_type(mut self, trial_type: impl Into<String>) -> Self {
        self.trial_type = Some(trial_type.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn correct_response(&self) -> Result<CorrectResponse, UnknownResponse> {
        self.correct_response.parse()
    }

    pub fn is_trial_type(&self, trial_type: &str) -> bool {
        self.trial_type.as_deref() == Some(trial_type)
    }

    /// Both images of this record, left first.
    pub fn images(&self) -> [&Atom; 2] {
        [&self.left_image, &self.right_image]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_responses() {
        assert_eq!("same".parse::<CorrectResponse>(), Ok(CorrectResponse::Same));
        assert_eq!(" different ".parse::<CorrectResponse>(), Ok(CorrectResponse::Different));
    }

    #[test]
    fn rejects_other_responses() {
        let err = "Same".parse::<CorrectResponse>().unwrap_err();
        assert_eq!(err, UnknownResponse("Same".into()));
        assert!("".parse::<CorrectResponse>().is_err());
        assert!("diff".parse::<CorrectResponse>().is_err());
        assert_eq!(
            err.to_string(),
            "unrecognized correct_response \"Same\" (expected \"same\" or \"different\")"
        );
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn trial_type_matches_exactly() {
        let rec = TrialRecord::new("a.png", "a.png", "same").with_trial_type("identity");
        assert!(rec.is_trial_type("identity"));
        assert!(!rec.is_trial_type("category"));
        assert_eq!(&*rec.images()[0], "a.png");
    }
}
