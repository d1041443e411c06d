mod manual;
mod timer;

pub use manual::ManualTimer;
pub use timer::{FrameStats, FrameTimes, HighPrecisionTimer, Timer};
