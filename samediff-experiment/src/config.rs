use samediff_core::KeyMapping;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PARTICIPANT: &str = "unknown";

/// Which numbered trial list a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Condition(u8);

impl Condition {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(n: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&n).then_some(Self(n))
    }

    /// Absent, unparseable or out-of-range values select condition 1.
    pub fn resolve(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<u8>().ok())
            .and_then(Self::new)
            .unwrap_or_default()
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-run parameters, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    pub condition: Condition,
    pub participant: String,
    pub keys: KeyMapping,
}

impl RunParams {
    pub fn resolve(
        condition: Option<&str>,
        subj_code: Option<&str>,
        response_key_config: Option<&str>,
    ) -> Self {
        let participant = subj_code
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PARTICIPANT)
            .to_string();
        Self {
            condition: Condition::resolve(condition),
            participant,
            keys: KeyMapping::resolve(response_key_config),
        }
    }
}

impl Default for RunParams {
    fn default() -> Self {
        Self::resolve(None, None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub fixation: Duration,
    pub placeholder: Duration,
    /// Length of the feedback step when no cue plays.
    pub feedback_passthrough: Duration,
    pub inter_trial: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fixation: Duration::from_millis(1000),
            placeholder: Duration::from_millis(500),
            feedback_passthrough: Duration::from_millis(1),
            inter_trial: Duration::from_millis(750),
        }
    }
}

/// Protocol constants for one run. Built once at startup and only ever
/// borrowed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub keys: KeyMapping,
    pub timings: Timings,
    pub feedback_audio: PathBuf,
    /// Key that advances instruction, transition and debrief screens.
    pub continue_key: char,
    /// Relative path of a condition's trial list; `{N}` is the condition number.
    pub trial_list_template: String,
}

impl ExperimentConfig {
    pub fn new(keys: KeyMapping) -> Self {
        Self {
            keys,
            timings: Timings::default(),
            feedback_audio: PathBuf::from("audio/incorrect.wav"),
            continue_key: ' ',
            trial_list_template: "trial_lists/trials_condition_{N}.csv".to_string(),
        }
    }

    pub fn with_feedback_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.feedback_audio = path.into();
        self
    }

    pub fn trial_list_resource(&self, condition: Condition) -> String {
        self.trial_list_template
            .replace("{N}", &condition.number().to_string())
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::new(KeyMapping::default())
    }
}
