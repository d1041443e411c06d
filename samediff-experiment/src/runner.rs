use crate::error::{ExperimentError, ExportError, LoadError};
use crate::timeline::{SaveRequest, Timeline, TimelineNode};
use samediff_core::{
    Display, PhaseDescriptor, PhaseDuration, PhaseKind, PreloadManifest, Stage, TextScreen,
    TrialOutcome, TrialState,
};
use samediff_timing::Timer;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

/// What the runner needs from its host: asset loading, audio and saving.
pub trait RunEnv {
    fn preload(&mut self, manifest: &PreloadManifest) -> Result<(), LoadError>;

    /// Starts the cue. `feedback_playing` must report `true` from the moment
    /// this returns until playback has finished.
    fn play_feedback(&mut self, audio: &Path);

    fn feedback_playing(&self) -> bool;

    /// Blocks until the attempt resolves.
    fn export(&mut self, request: &SaveRequest, outcomes: &[TrialOutcome])
    -> Result<(), ExportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    StageEntered(Stage),
    Preloaded {
        images: usize,
        audio: usize,
    },
    TrialStarted {
        stage: Stage,
        number: usize,
    },
    ResponseRecorded {
        is_practice: bool,
        correct: bool,
        rt_ms: f64,
    },
    FeedbackStarted,
    Exported {
        filename: String,
    },
    ExportFailed {
        filename: String,
        message: String,
    },
    Finished,
}

#[derive(Debug, Clone)]
struct ActivePhase {
    descriptor: PhaseDescriptor,
    started_ns: u64,
    /// Set once the host has put this phase on screen.
    presented: bool,
    trial_state: Option<TrialState>,
}

/// Executes a timeline one phase at a time.
///
/// The host calls [`TrialRunner::update`] every frame,
/// [`TrialRunner::mark_presented`] after each present and
/// [`TrialRunner::handle_key`] on key presses. Fixed phases end once their
/// duration has elapsed on the timer, audio phases when the host reports the
/// cue finished, input phases on an accepted key.
pub struct TrialRunner<T>
where
    T: Timer<Timestamp = u64>,
{
    timeline: Timeline,
    timer: T,
    node: usize,
    active: Option<ActivePhase>,
    stage: Option<Stage>,
    /// Outcome of the response phase of the sequence currently running.
    /// Cleared whenever a new sequence starts.
    outcome: Option<TrialOutcome>,
    results: Vec<TrialOutcome>,
    block_position: usize,
    started: bool,
    finished: bool,
}

impl<T> TrialRunner<T>
where
    T: Timer<Timestamp = u64>,
{
    pub fn new(timeline: Timeline, timer: T) -> Self {
        Self {
            timeline,
            timer,
            node: 0,
            active: None,
            stage: None,
            outcome: None,
            results: Vec::new(),
            block_position: 0,
            started: false,
            finished: false,
        }
    }

    pub fn start(&mut self, env: &mut impl RunEnv) -> Result<Vec<RunnerEvent>, ExperimentError> {
        let mut events = Vec::new();
        if !self.started {
            self.started = true;
            self.enter_node(0, env, &mut events)?;
        }
        Ok(events)
    }

    pub fn update(&mut self, env: &mut impl RunEnv) -> Result<Vec<RunnerEvent>, ExperimentError> {
        let mut events = Vec::new();
        if !self.started || self.finished {
            return Ok(events);
        }

        if let Some(TimelineNode::Save(request)) = self.timeline.get(self.node) {
            let request = request.clone();
            match env.export(&request, &self.results) {
                Ok(()) => events.push(RunnerEvent::Exported {
                    filename: request.filename,
                }),
                Err(e) => {
                    error!(filename = %request.filename, error = %e, "export failed; continuing to debrief");
                    events.push(RunnerEvent::ExportFailed {
                        filename: request.filename,
                        message: e.to_string(),
                    });
                }
            }
            self.enter_node(self.node + 1, env, &mut events)?;
            return Ok(events);
        }

        let Some(active) = &self.active else {
            return Ok(events);
        };
        let done = match active.descriptor.duration {
            PhaseDuration::Fixed(d) => self.timer.elapsed(active.started_ns) >= d,
            PhaseDuration::UntilAudioEnds => !env.feedback_playing(),
            PhaseDuration::UntilInput => false,
        };
        if done {
            self.advance(env, &mut events)?;
        }
        Ok(events)
    }

    /// Keys the active phase doesn't accept are ignored.
    pub fn handle_key(
        &mut self,
        key: char,
        env: &mut impl RunEnv,
    ) -> Result<Vec<RunnerEvent>, ExperimentError> {
        let mut events = Vec::new();
        if self.finished {
            return Ok(events);
        }
        let Some(active) = &self.active else {
            return Ok(events);
        };
        if !active.descriptor.input.accepts(key) {
            return Ok(events);
        }
        let (trial_state, started_ns) = (active.trial_state, active.started_ns);

        if trial_state == Some(TrialState::Response) {
            let rt_ms = self.timer.elapsed(started_ns).as_nanos() as f64 / 1_000_000.0;
            let Some(outcome) = self
                .timeline
                .get(self.node)
                .and_then(TimelineNode::as_trial)
                .and_then(|seq| seq.complete_response(key, rt_ms, self.results.len()))
            else {
                return Ok(events);
            };
            info!(
                practice = outcome.is_practice,
                key = %outcome.response,
                correct = outcome.correct,
                rt_ms = format_args!("{:.3}", rt_ms),
                "response recorded"
            );
            events.push(RunnerEvent::ResponseRecorded {
                is_practice: outcome.is_practice,
                correct: outcome.correct,
                rt_ms,
            });
            self.results.push(outcome.clone());
            self.outcome = Some(outcome);
        }

        self.advance(env, &mut events)?;
        Ok(events)
    }

    fn advance(
        &mut self,
        env: &mut impl RunEnv,
        events: &mut Vec<RunnerEvent>,
    ) -> Result<(), ExperimentError> {
        let next_state = self
            .active
            .as_ref()
            .and_then(|a| a.trial_state)
            .and_then(|s| s.next());
        let seq = self.timeline.get(self.node).and_then(TimelineNode::as_trial);
        let (Some(seq), Some(state)) = (seq, next_state) else {
            return self.enter_node(self.node + 1, env, events);
        };

        let descriptor = seq.phase(state, self.outcome.as_ref());
        if let Some(audio) = &descriptor.audio {
            debug!(audio = %audio.display(), "playing feedback");
            env.play_feedback(audio);
            events.push(RunnerEvent::FeedbackStarted);
        }
        self.activate(descriptor, Some(state));
        Ok(())
    }

    fn enter_node(
        &mut self,
        mut index: usize,
        env: &mut impl RunEnv,
        events: &mut Vec<RunnerEvent>,
    ) -> Result<(), ExperimentError> {
        loop {
            self.node = index;
            self.active = None;

            let Some(node) = self.timeline.get(index) else {
                if !self.finished {
                    self.finished = true;
                    info!(responses = self.results.len(), "run finished");
                    events.push(RunnerEvent::Finished);
                }
                return Ok(());
            };

            let stage = node.stage();
            if self.stage != Some(stage) {
                self.stage = Some(stage);
                self.block_position = 0;
                info!(stage = stage.label(), "stage entered");
                events.push(RunnerEvent::StageEntered(stage));
            }

            match node {
                TimelineNode::Preload(manifest) => {
                    env.preload(manifest)?;
                    info!(
                        images = manifest.images.len(),
                        audio = manifest.audio.len(),
                        "preload complete"
                    );
                    events.push(RunnerEvent::Preloaded {
                        images: manifest.images.len(),
                        audio: manifest.audio.len(),
                    });
                    index += 1;
                }
                TimelineNode::Screen { phase, .. } => {
                    let phase = phase.clone();
                    self.activate(phase, None);
                    return Ok(());
                }
                TimelineNode::Trial(seq) => {
                    let phase = seq.phase(TrialState::Fixation, None);
                    debug!(
                        stage = stage.label(),
                        left = %seq.record().left_image,
                        right = %seq.record().right_image,
                        correct_key = %seq.correct_key(),
                        "trial started"
                    );
                    self.outcome = None;
                    self.block_position += 1;
                    events.push(RunnerEvent::TrialStarted {
                        stage,
                        number: self.block_position,
                    });
                    self.activate(phase, Some(TrialState::Fixation));
                    return Ok(());
                }
                TimelineNode::Save(_) => {
                    let saving = TextScreen::new("Saving your data").paragraph("Please wait.");
                    self.activate(
                        PhaseDescriptor::timed(
                            PhaseKind::Screen,
                            Display::Text(saving),
                            Duration::ZERO,
                        ),
                        None,
                    );
                    return Ok(());
                }
            }
        }
    }

    fn activate(&mut self, descriptor: PhaseDescriptor, trial_state: Option<TrialState>) {
        self.active = Some(ActivePhase {
            descriptor,
            started_ns: self.timer.now(),
            presented: false,
            trial_state,
        });
    }

    /// Restarts the active phase's clock at the first present that shows it.
    /// Fixed durations and response latency count from there; hosts that
    /// never call this time phases from activation.
    pub fn mark_presented(&mut self) {
        if let Some(active) = &mut self.active {
            if !active.presented {
                active.presented = true;
                active.started_ns = self.timer.now();
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn current_phase(&self) -> Option<&PhaseDescriptor> {
        self.active.as_ref().map(|a| &a.descriptor)
    }

    pub fn current_display(&self) -> Option<&Display> {
        self.current_phase().map(|p| &p.display)
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn current_trial_state(&self) -> Option<TrialState> {
        self.active.as_ref().and_then(|a| a.trial_state)
    }

    pub fn is_awaiting_input(&self) -> bool {
        self.current_phase().is_some_and(PhaseDescriptor::ends_on_input)
    }

    /// `(trial, of)` within the practice or main block.
    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        let stage = self.stage.filter(Stage::is_trial_block)?;
        Some((self.block_position, self.timeline.block_len(stage)))
    }

    /// Time left in the active fixed-duration phase.
    pub fn time_to_deadline(&self) -> Option<Duration> {
        let active = self.active.as_ref()?;
        let d = active.descriptor.fixed_duration()?;
        Some(d.saturating_sub(self.timer.elapsed(active.started_ns)))
    }

    pub fn results(&self) -> &[TrialOutcome] {
        &self.results
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Condition, ExperimentConfig};
    use crate::timeline::TimelineBuilder;
    use samediff_core::{KeyMapping, TrialRecord};
    use samediff_timing::ManualTimer;

    #[derive(Default)]
    struct FakeEnv {
        preloaded: Vec<PreloadManifest>,
        played: usize,
        playing: bool,
        exports: usize,
        reject_export: bool,
    }

    impl RunEnv for FakeEnv {
        fn preload(&mut self, manifest: &PreloadManifest) -> Result<(), LoadError> {
            self.preloaded.push(manifest.clone());
            Ok(())
        }
        fn play_feedback(&mut self, _audio: &Path) {
            self.played += 1;
            self.playing = true;
        }
        fn feedback_playing(&self) -> bool {
            self.playing
        }
        fn export(&mut self, req: &SaveRequest, _: &[TrialOutcome]) -> Result<(), ExportError> {
            self.exports += 1;
            if self.reject_export {
                return Err(ExportError::Rejected {
                    filename: req.filename.clone(),
                    status: 500,
                });
            }
            Ok(())
        }
    }

    fn runner() -> (TrialRunner<ManualTimer>, ManualTimer) {
        let trials = vec![
            TrialRecord::new("cat1.png", "cat1.png", "same").with_trial_type("identity"),
            TrialRecord::new("dog1.png", "dog2.png", "different").with_trial_type("category"),
        ];
        let cfg = ExperimentConfig::new(KeyMapping::STANDARD);
        let timeline = TimelineBuilder::new(&cfg)
            .build(&trials, "P1", Condition::default())
            .unwrap();
        let timer = ManualTimer::new();
        (TrialRunner::new(timeline, timer.clone()), timer)
    }

    #[test]
    fn start_preloads_and_waits_on_instructions() {
        let (mut r, _) = runner();
        let mut env = FakeEnv::default();
        let events = r.start(&mut env).unwrap();
        assert_eq!(env.preloaded.len(), 1);
        assert!(events.contains(&RunnerEvent::StageEntered(Stage::Instructions)));
        assert_eq!(r.current_stage(), Some(Stage::Instructions));
        assert!(r.is_awaiting_input());
        assert!(matches!(r.current_display(), Some(Display::Text(_))));

        // Response keys do nothing on a screen.
        assert!(r.handle_key('z', &mut env).unwrap().is_empty());
        assert_eq!(r.current_stage(), Some(Stage::Instructions));
    }

    #[test]
    fn fixed_phases_wait_for_their_duration() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        r.start(&mut env).unwrap();
        r.handle_key(' ', &mut env).unwrap();

        assert_eq!(r.current_stage(), Some(Stage::Practice));
        assert_eq!(r.current_trial_state(), Some(TrialState::Fixation));
        assert_eq!(r.trial_progress(), Some((1, 4)));

        timer.advance_ms(999);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Fixation));
        assert_eq!(r.time_to_deadline(), Some(Duration::from_millis(1)));

        timer.advance_ms(1);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Placeholder));
        assert_eq!(r.current_display(), Some(&Display::Placeholder));

        // Keys are ignored outside the response phase.
        r.handle_key('z', &mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Placeholder));
        assert!(r.results().is_empty());

        timer.advance_ms(500);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Response));
        assert_eq!(r.time_to_deadline(), None);
    }

    #[test]
    fn response_latency_is_measured_from_onset() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        r.start(&mut env).unwrap();
        r.handle_key(' ', &mut env).unwrap();
        timer.advance_ms(1000);
        r.update(&mut env).unwrap();
        timer.advance_ms(500);
        r.update(&mut env).unwrap();

        timer.advance_ms(10_000);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Response));

        timer.advance_ms(412);
        r.handle_key('x', &mut env).unwrap();
        assert!(r.results().is_empty());
        let events = r.handle_key('z', &mut env).unwrap();
        assert_eq!(r.results().len(), 1);
        assert_eq!(r.results()[0].rt_ms, 10_412.0);
        assert!(r.results()[0].is_practice);
        assert!(events.iter().any(|e| matches!(e, RunnerEvent::ResponseRecorded { correct: true, .. })));
        assert_eq!(r.current_trial_state(), Some(TrialState::Feedback));
    }

    #[test]
    fn latency_counts_from_first_present() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        r.start(&mut env).unwrap();
        r.handle_key(' ', &mut env).unwrap();
        r.mark_presented();
        timer.advance_ms(1000);
        r.update(&mut env).unwrap();
        r.mark_presented();
        timer.advance_ms(500);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Response));

        // The pair reaches the screen one frame after the phase began.
        timer.advance_ms(16);
        r.mark_presented();
        timer.advance_ms(300);
        r.mark_presented();
        timer.advance_ms(100);
        r.handle_key('z', &mut env).unwrap();
        assert_eq!(r.results()[0].rt_ms, 400.0);
    }

    #[test]
    fn fixed_phase_runs_from_its_first_present() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        r.start(&mut env).unwrap();
        r.handle_key(' ', &mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Fixation));

        timer.advance_ms(10);
        r.mark_presented();
        timer.advance_ms(995);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Fixation));
        timer.advance_ms(5);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Placeholder));
    }

    fn to_first_response(r: &mut TrialRunner<ManualTimer>, timer: &ManualTimer, env: &mut FakeEnv) {
        r.start(env).unwrap();
        r.handle_key(' ', env).unwrap();
        timer.advance_ms(1000);
        r.update(env).unwrap();
        timer.advance_ms(500);
        r.update(env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Response));
    }

    /// Presses `key` on every response phase and skips through everything else.
    fn run_to_end(
        r: &mut TrialRunner<ManualTimer>,
        timer: &ManualTimer,
        env: &mut FakeEnv,
        key: char,
    ) -> Vec<RunnerEvent> {
        let mut events = r.start(env).unwrap();
        for _ in 0..1000 {
            if r.is_finished() {
                break;
            }
            if r.is_awaiting_input() {
                let k = match r.current_trial_state() {
                    Some(TrialState::Response) => key,
                    _ => ' ',
                };
                events.extend(r.handle_key(k, env).unwrap());
            } else {
                env.playing = false;
                if let Some(d) = r.time_to_deadline() {
                    timer.advance(d);
                }
                events.extend(r.update(env).unwrap());
            }
        }
        events
    }

    #[test]
    fn correct_response_skips_audio() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        to_first_response(&mut r, &timer, &mut env);

        // First practice item is a "same" pair; z means same.
        let events = r.handle_key('z', &mut env).unwrap();
        assert!(!events.contains(&RunnerEvent::FeedbackStarted));
        assert_eq!(env.played, 0);
        assert!(r.results()[0].correct);
        assert_eq!(r.current_trial_state(), Some(TrialState::Feedback));
        assert!(!r.current_phase().unwrap().plays_audio());

        timer.advance_ms(1);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::InterTrial));
        timer.advance_ms(750);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Fixation));
        assert_eq!(r.trial_progress(), Some((2, 4)));
    }

    #[test]
    fn incorrect_response_waits_for_the_cue() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        to_first_response(&mut r, &timer, &mut env);

        let events = r.handle_key('/', &mut env).unwrap();
        assert!(events.contains(&RunnerEvent::FeedbackStarted));
        assert_eq!(env.played, 1);
        assert!(!r.results()[0].correct);
        assert_eq!(r.current_trial_state(), Some(TrialState::Feedback));

        timer.advance_ms(5000);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Feedback));

        env.playing = false;
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::InterTrial));
    }

    #[test]
    fn feedback_only_sees_its_own_trial() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        to_first_response(&mut r, &timer, &mut env);

        r.handle_key('/', &mut env).unwrap();
        env.playing = false;
        r.update(&mut env).unwrap();
        timer.advance_ms(750);
        r.update(&mut env).unwrap();
        assert_eq!(r.trial_progress(), Some((2, 4)));

        // Second item is "different"; the earlier miss must not leak into it.
        assert_eq!(r.current_phase().map(|p| p.kind), Some(PhaseKind::Fixation));
        timer.advance_ms(1000);
        r.update(&mut env).unwrap();
        timer.advance_ms(500);
        r.update(&mut env).unwrap();
        assert_eq!(r.current_trial_state(), Some(TrialState::Response));
        let events = r.handle_key('/', &mut env).unwrap();
        assert!(!events.contains(&RunnerEvent::FeedbackStarted));
        assert_eq!(env.played, 1);
        assert!(r.results()[1].correct);
    }

    #[test]
    fn full_run_records_every_response() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        let events = run_to_end(&mut r, &timer, &mut env, 'z');

        assert!(r.is_finished());
        assert_eq!(events.last(), Some(&RunnerEvent::Finished));
        assert_eq!(r.results().len(), 4 + 2);
        assert_eq!(r.results().iter().filter(|o| o.is_practice).count(), 4);
        let idx: Vec<usize> = r.results().iter().map(|o| o.sequence_index).collect();
        assert_eq!(idx, [0, 1, 2, 3, 4, 5]);
        assert_eq!(env.exports, 1);
        assert!(events.iter().any(|e| matches!(e, RunnerEvent::Exported { filename } if filename == "P1_condition1.csv")));

        let stages: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                RunnerEvent::StageEntered(s) => Some(*s),
                _ => None,
            })
            .collect();
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
    }

    #[test]
    fn failed_export_still_reaches_debrief() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv {
            reject_export: true,
            ..FakeEnv::default()
        };
        let events = run_to_end(&mut r, &timer, &mut env, '/');
        assert!(r.is_finished());
        assert!(events.iter().any(|e| matches!(e, RunnerEvent::ExportFailed { .. })));
        assert!(events.contains(&RunnerEvent::StageEntered(Stage::Debrief)));
        assert_eq!(r.results().len(), 6);
    }

    #[test]
    fn input_after_finish_is_ignored() {
        let (mut r, timer) = runner();
        let mut env = FakeEnv::default();
        run_to_end(&mut r, &timer, &mut env, 'z');
        assert!(r.handle_key(' ', &mut env).unwrap().is_empty());
        assert!(r.update(&mut env).unwrap().is_empty());
        assert_eq!(r.current_phase(), None);
    }
}
