use crate::keys::normalize_key;
use crate::stimulus::Display;
use std::path::PathBuf;
use std::time::Duration;

/// Run-level stages, in the order a run passes through them
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Preload,
    Instructions,
    Practice,
    Transition,
    Main,
    Save,
    Debrief,
}

impl Stage {
    pub fn is_practice(&self) -> bool {
        matches!(self, Stage::Practice)
    }

    pub fn is_main(&self) -> bool {
        matches!(self, Stage::Main)
    }

    pub fn is_trial_block(&self) -> bool {
        self.is_practice() || self.is_main()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Preload => "preload",
            Stage::Instructions => "instructions",
            Stage::Practice => "practice",
            Stage::Transition => "transition",
            Stage::Main => "main",
            Stage::Save => "save",
            Stage::Debrief => "debrief",
        }
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum PhaseKind {
    Fixation,
    Placeholder,
    Stimulus,
    Feedback,
    InterTrial,
    Screen,
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum PhaseDuration {
    Fixed(Duration),
    UntilInput,
    UntilAudioEnds,
}

/// Keys a phase reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputSet {
    #[default]
    None,
    Keys(Vec<char>),
}

impl InputSet {
    pub fn accepts(&self, key: char) -> bool {
        match self {
            InputSet::None => false,
            InputSet::Keys(keys) => keys.contains(&normalize_key(key)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, InputSet::None)
    }
}

/// One timed step the runner executes.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDescriptor {
    pub kind: PhaseKind,
    pub display: Display,
    pub input: InputSet,
    pub duration: PhaseDuration,
    pub audio: Option<PathBuf>,
}

impl PhaseDescriptor {
    /// A phase that ignores input and ends after `duration`.
    pub fn timed(kind: PhaseKind, display: Display, duration: Duration) -> Self {
        Self {
            kind,
            display,
            input: InputSet::None,
            duration: PhaseDuration::Fixed(duration),
            audio: None,
        }
    }

    /// A phase that waits, without limit, for one of `keys`.
    pub fn until_key(kind: PhaseKind, display: Display, keys: impl Into<Vec<char>>) -> Self {
        Self {
            kind,
            display,
            input: InputSet::Keys(keys.into()),
            duration: PhaseDuration::UntilInput,
            audio: None,
        }
    }

    /// A phase that plays `audio` and ends when playback does.
    pub fn audio_cue(kind: PhaseKind, display: Display, audio: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            display,
            input: InputSet::None,
            duration: PhaseDuration::UntilAudioEnds,
            audio: Some(audio.into()),
        }
    }

    pub fn ends_on_input(&self) -> bool {
        matches!(self.duration, PhaseDuration::UntilInput)
    }

    pub fn plays_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn fixed_duration(&self) -> Option<Duration> {
        match self.duration {
            PhaseDuration::Fixed(d) => Some(d),
            _ => None,
        }
    }
}
