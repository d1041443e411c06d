//! Expansion of one trial record into its five timed phases.
//!
//! fixation → placeholder → stimulus/response → feedback → inter-trial
//! interval. The feedback phase is not built up front: it is derived from the
//! outcome of the response phase once that outcome exists, so there is no
//! state shared between phases or between trials.

use crate::config::{ExperimentConfig, Timings};
use crate::error::ConfigError;
use samediff_core::keys::normalize_key;
use samediff_core::{
    CorrectResponse, Display, KeyMapping, PhaseDescriptor, PhaseKind, TrialOutcome, TrialRecord,
    TrialState,
};
use std::path::PathBuf;

pub struct TrialSequenceFactory<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> TrialSequenceFactory<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    /// Fails if the record's `correct_response` is not `same`/`different`.
    pub fn build(
        &self,
        record: &TrialRecord,
        is_practice: bool,
    ) -> Result<TrialSequence, ConfigError> {
        let correct_response = record.correct_response()?;
        Ok(TrialSequence {
            record: record.clone(),
            is_practice,
            correct_response,
            keys: self.config.keys,
            timings: self.config.timings.clone(),
            feedback_audio: self.config.feedback_audio.clone(),
        })
    }
}

/// The phases of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSequence {
    record: TrialRecord,
    is_practice: bool,
    correct_response: CorrectResponse,
    keys: KeyMapping,
    timings: Timings,
    feedback_audio: PathBuf,
}

impl TrialSequence {
    pub const LEN: usize = TrialState::ORDER.len();

    pub fn record(&self) -> &TrialRecord {
        &self.record
    }

    pub fn is_practice(&self) -> bool {
        self.is_practice
    }

    pub fn correct_response(&self) -> CorrectResponse {
        self.correct_response
    }

    pub fn correct_key(&self) -> char {
        self.keys.key_for(self.correct_response)
    }

    /// Descriptor for `state`. `outcome` only matters for the feedback step
    /// and must be the outcome of this sequence's own response phase.
    pub fn phase(&self, state: TrialState, outcome: Option<&TrialOutcome>) -> PhaseDescriptor {
        match state {
            TrialState::Fixation => PhaseDescriptor::timed(
                PhaseKind::Fixation,
                Display::Fixation,
                self.timings.fixation,
            ),
            TrialState::Placeholder => PhaseDescriptor::timed(
                PhaseKind::Placeholder,
                Display::Placeholder,
                self.timings.placeholder,
            ),
            TrialState::Response => self.response_phase(),
            TrialState::Feedback => self.feedback_phase(outcome),
            TrialState::InterTrial => PhaseDescriptor::timed(
                PhaseKind::InterTrial,
                Display::Blank,
                self.timings.inter_trial,
            ),
        }
    }

    pub fn response_phase(&self) -> PhaseDescriptor {
        PhaseDescriptor::until_key(
            PhaseKind::Stimulus,
            Display::ImagePair {
                left: self.record.left_image.clone(),
                right: self.record.right_image.clone(),
            },
            self.keys.keys(),
        )
    }

    /// The audio cue when the response was wrong; otherwise a silent
    /// pass-through, including when no response has been scored.
    pub fn feedback_phase(&self, outcome: Option<&TrialOutcome>) -> PhaseDescriptor {
        match outcome {
            Some(o) if !o.correct => PhaseDescriptor::audio_cue(
                PhaseKind::Feedback,
                Display::Blank,
                self.feedback_audio.clone(),
            ),
            _ => PhaseDescriptor::timed(
                PhaseKind::Feedback,
                Display::Blank,
                self.timings.feedback_passthrough,
            ),
        }
    }

    /// Scores a key press on the response phase. Keys outside the mapping
    /// return `None` and do not end the phase.
    pub fn complete_response(
        &self,
        pressed: char,
        rt_ms: f64,
        sequence_index: usize,
    ) -> Option<TrialOutcome> {
        let pressed = normalize_key(pressed);
        if !self.keys.accepts(pressed) {
            return None;
        }
        Some(TrialOutcome::score(
            &self.record,
            self.correct_response,
            self.correct_key(),
            pressed,
            rt_ms,
            self.is_practice,
            sequence_index,
        ))
    }
}
