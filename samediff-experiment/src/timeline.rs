use crate::config::{Condition, ExperimentConfig};
use crate::error::ConfigError;
use crate::export::export_filename;
use crate::practice::select_practice;
use crate::sequence::{TrialSequence, TrialSequenceFactory};
use samediff_core::keys::key_label;
use samediff_core::{
    Display, PhaseDescriptor, PhaseKind, PreloadManifest, Stage, TextScreen, TrialRecord,
};
use tracing::info;

/// Where and under which name results are saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub participant: String,
    pub condition: Condition,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineNode {
    Preload(PreloadManifest),
    Screen { stage: Stage, phase: PhaseDescriptor },
    Trial(Box<TrialSequence>),
    Save(SaveRequest),
}

impl TimelineNode {
    pub fn stage(&self) -> Stage {
        match self {
            TimelineNode::Preload(_) => Stage::Preload,
            TimelineNode::Screen { stage, .. } => *stage,
            TimelineNode::Trial(seq) if seq.is_practice() => Stage::Practice,
            TimelineNode::Trial(_) => Stage::Main,
            TimelineNode::Save(_) => Stage::Save,
        }
    }

    pub fn as_trial(&self) -> Option<&TrialSequence> {
        match self {
            TimelineNode::Trial(seq) => Some(&**seq),
            _ => None,
        }
    }
}

/// The whole run, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    nodes: Vec<TimelineNode>,
    practice_trials: usize,
    main_trials: usize,
}

impl Timeline {
    pub fn nodes(&self) -> &[TimelineNode] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&TimelineNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn practice_trials(&self) -> usize {
        self.practice_trials
    }

    pub fn main_trials(&self) -> usize {
        self.main_trials
    }

    pub fn trials(&self) -> impl Iterator<Item = &TrialSequence> {
        self.nodes.iter().filter_map(TimelineNode::as_trial)
    }

    /// Number of trials in `stage`'s block.
    pub fn block_len(&self, stage: Stage) -> usize {
        match stage {
            Stage::Practice => self.practice_trials,
            Stage::Main => self.main_trials,
            _ => 0,
        }
    }
}

pub struct TimelineBuilder<'a> {
    config: &'a ExperimentConfig,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Self {
        Self { config }
    }

    /// Assembles preload, instructions, practice, transition, main trials in
    /// list order, save and debrief. Any bad record aborts the build.
    pub fn build(
        &self,
        trials: &[TrialRecord],
        participant: &str,
        condition: Condition,
    ) -> Result<Timeline, ConfigError> {
        let factory = TrialSequenceFactory::new(self.config);
        let practice = select_practice(trials)?;

        let practice_sequences = build_block(&factory, &practice.items, true)?;
        let main_sequences = build_block(&factory, trials, false)?;

        let mut nodes = Vec::with_capacity(main_sequences.len() + practice_sequences.len() + 5);
        nodes.push(TimelineNode::Preload(self.preload_manifest(trials)));
        nodes.push(self.screen(Stage::Instructions, self.instructions()));
        let (practice_trials, main_trials) = (practice_sequences.len(), main_sequences.len());
        nodes.extend(practice_sequences);
        nodes.push(self.screen(Stage::Transition, self.transition()));
        nodes.extend(main_sequences);
        nodes.push(TimelineNode::Save(SaveRequest {
            participant: participant.to_string(),
            condition,
            filename: export_filename(participant, condition),
        }));
        nodes.push(self.screen(Stage::Debrief, self.debrief()));

        info!(
            practice = practice_trials,
            main = main_trials,
            nodes = nodes.len(),
            different_practice = ?practice.different_source,
            "timeline built"
        );

        Ok(Timeline {
            nodes,
            practice_trials,
            main_trials,
        })
    }

    /// Every image the trial list references, plus the feedback cue.
    pub fn preload_manifest(&self, trials: &[TrialRecord]) -> PreloadManifest {
        PreloadManifest {
            images: PreloadManifest::collect_images(trials.iter().flat_map(|t| t.images())),
            audio: vec![self.config.feedback_audio.clone()],
        }
    }

    fn screen(&self, stage: Stage, text: TextScreen) -> TimelineNode {
        TimelineNode::Screen {
            stage,
            phase: PhaseDescriptor::until_key(
                PhaseKind::Screen,
                Display::Text(text),
                [self.config.continue_key],
            ),
        }
    }

    fn continue_prompt(&self, what: &str) -> String {
        format!("Press {} to {what}.", key_label(self.config.continue_key))
    }

    fn instructions(&self) -> TextScreen {
        let keys = self.config.keys;
        TextScreen::new("Same or different?")
            .paragraph(
                "On each trial a cross appears in the middle of the screen, \
                 followed by two pictures side by side.",
            )
            .paragraph(format!(
                "If the two pictures are the SAME, press {}.",
                key_label(keys.same_key)
            ))
            .paragraph(format!(
                "If the two pictures are DIFFERENT, press {}.",
                key_label(keys.diff_key)
            ))
            .paragraph(
                "Respond as quickly and as accurately as you can. \
                 A sound plays when a response is wrong.",
            )
            .paragraph("You will start with a few practice trials.")
            .prompt(self.continue_prompt("begin the practice"))
    }

    fn transition(&self) -> TextScreen {
        let keys = self.config.keys;
        TextScreen::new("Practice complete")
            .paragraph("The main task is about to begin.")
            .paragraph(format!(
                "Remember: {} for SAME, {} for DIFFERENT.",
                key_label(keys.same_key),
                key_label(keys.diff_key)
            ))
            .prompt(self.continue_prompt("start"))
    }

    fn debrief(&self) -> TextScreen {
        TextScreen::new("Thank you!")
            .paragraph("The experiment is complete and your responses have been recorded.")
            .paragraph("Please let the experimenter know you have finished.")
            .prompt(self.continue_prompt("exit"))
    }
}

fn build_block(
    factory: &TrialSequenceFactory<'_>,
    records: &[TrialRecord],
    is_practice: bool,
) -> Result<Vec<TimelineNode>, ConfigError> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            factory
                .build(record, is_practice)
                .map(|seq| TimelineNode::Trial(Box::new(seq)))
                .map_err(|e| ConfigError::AtTrial {
                    block: if is_practice { "practice" } else { "main" },
                    position: i + 1,
                    source: Box::new(e),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use samediff_core::KeyMapping;

    fn trials() -> Vec<TrialRecord> {
        vec![
            TrialRecord::new("dog1.png", "dog2.png", "different").with_trial_type("category"),
            TrialRecord::new("cat1.png", "cat1.png", "same").with_trial_type("identity"),
            TrialRecord::new("dog3.png", "dog1.png", "different").with_trial_type("category"),
            TrialRecord::new("cow1.png", "cow1.png", "same").with_trial_type("identity"),
        ]
    }

    fn build(trials: &[TrialRecord]) -> Result<Timeline, ConfigError> {
        let cfg = ExperimentConfig::new(KeyMapping::STANDARD);
        TimelineBuilder::new(&cfg).build(trials, "P01", Condition::new(2).unwrap())
    }

    #[test]
    fn stages_in_run_order() {
        let tl = build(&trials()).unwrap();
        let mut stages: Vec<Stage> = tl.nodes().iter().map(TimelineNode::stage).collect();
        stages.dedup();
        assert_eq!(
            stages,
            [
                Stage::Preload,
                Stage::Instructions,
                Stage::Practice,
                Stage::Transition,
                Stage::Main,
                Stage::Save,
                Stage::Debrief,
            ]
        );
        assert_eq!(tl.len(), 1 + 1 + 4 + 1 + 4 + 1 + 1);
        assert_eq!(tl.practice_trials(), 4);
        assert_eq!(tl.main_trials(), 4);
    }

    #[test]
    fn main_trials_keep_list_order_after_practice() {
        let input = trials();
        let tl = build(&input).unwrap();
        let seqs: Vec<&TrialSequence> = tl.trials().collect();
        let first_main = seqs.iter().position(|s| !s.is_practice()).unwrap();
        assert_eq!(first_main, 4);
        assert!(seqs[first_main..].iter().all(|s| !s.is_practice()));

        let main: Vec<&TrialRecord> = seqs[first_main..].iter().map(|s| s.record()).collect();
        let expected: Vec<&TrialRecord> = input.iter().collect();
        assert_eq!(main, expected);
    }

    #[test]
    fn preload_lists_unique_images_and_audio() {
        let tl = build(&trials()).unwrap();
        let TimelineNode::Preload(manifest) = &tl.nodes()[0] else {
            panic!("first node is not preload");
        };
        let names: Vec<&str> = manifest.images.iter().map(|a| &**a).collect();
        assert_eq!(names, ["dog1.png", "dog2.png", "cat1.png", "dog3.png", "cow1.png"]);
        assert_eq!(manifest.audio.len(), 1);
    }

    #[test]
    fn save_request_names_file() {
        let tl = build(&trials()).unwrap();
        let save = tl
            .nodes()
            .iter()
            .find_map(|n| match n {
                TimelineNode::Save(req) => Some(req),
                _ => None,
            })
            .unwrap();
        assert_eq!(save.filename, "P01_condition2.csv");
    }

    #[test]
    fn instructions_name_the_mapped_keys() {
        let cfg = ExperimentConfig::new(KeyMapping::from_flag(1));
        let tl = TimelineBuilder::new(&cfg)
            .build(&trials(), "P01", Condition::default())
            .unwrap();
        let TimelineNode::Screen { phase, .. } = &tl.nodes()[1] else {
            panic!("second node is not a screen");
        };
        let Display::Text(text) = &phase.display else {
            panic!("instructions are not text");
        };
        assert!(text.paragraphs.iter().any(|p| p.contains("SAME, press /")));
        assert!(text.paragraphs.iter().any(|p| p.contains("DIFFERENT, press Z")));
        assert!(phase.input.accepts(' '));
    }

    #[test]
    fn bad_record_aborts_build() {
        let mut input = trials();
        input[2].correct_response = "maybe".into();
        let err = build(&input).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::AtTrial {
                block: "main",
                position: 3,
                ..
            }
        ));
    }

    #[test]
    fn missing_identity_aborts_build() {
        let input: Vec<TrialRecord> = trials()
            .into_iter()
            .filter(|t| !t.is_trial_type("identity"))
            .collect();
        assert_eq!(build(&input).unwrap_err(), ConfigError::MissingIdentitySeed);
    }
}
