pub mod config;
pub mod error;
pub mod export;
pub mod practice;
pub mod runner;
pub mod sequence;
pub mod source;
pub mod summary;
pub mod timeline;
pub use config::{Condition, ExperimentConfig, RunParams, Timings};
pub use error::{ConfigError, ExperimentError, ExportError, LoadError};
pub use export::{DirectorySink, ExportReport, HttpSink, ResultExporter, ResultSink};
pub use practice::{DifferentSource, PracticeSet, select_practice};
pub use runner::{RunEnv, RunnerEvent, TrialRunner};
pub use sequence::{TrialSequence, TrialSequenceFactory};
pub use source::{DirectorySource, HttpSource, TrialListSource, load_trial_list};
pub use summary::{BlockSummary, RunSummary};
pub use timeline::{SaveRequest, Timeline, TimelineBuilder, TimelineNode};
