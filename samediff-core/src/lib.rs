pub mod keys;
pub mod phase;
pub mod record;
pub mod stimulus;
pub mod trial;

pub use keys::KeyMapping;
pub use phase::{InputSet, PhaseDescriptor, PhaseDuration, PhaseKind, Stage};
pub use record::{CorrectResponse, TrialRecord, UnknownResponse};
pub use stimulus::{Display, PreloadManifest, TextScreen};
pub use string_cache::DefaultAtom as Atom;
pub use trial::{TrialOutcome, TrialState};
