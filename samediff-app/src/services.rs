use crate::audio::FeedbackPlayer;
use samediff_core::{PreloadManifest, TrialOutcome};
use samediff_experiment::{ExportError, LoadError, ResultExporter, RunEnv, SaveRequest};
use samediff_render::ImageStore;
use std::path::Path;

/// The window's side of a run: decoded images, the audio cue, and the
/// result destination.
pub struct Services {
    pub images: ImageStore,
    pub audio: FeedbackPlayer,
    pub exporter: ResultExporter,
}

impl RunEnv for Services {
    fn preload(&mut self, manifest: &PreloadManifest) -> Result<(), LoadError> {
        for name in &manifest.images {
            self.images.load(name).map_err(|e| LoadError::Preload {
                resource: self.images.path_of(name).display().to_string(),
                message: format!("{e:#}"),
            })?;
        }
        for path in &manifest.audio {
            self.audio.load(path).map_err(|e| LoadError::Preload {
                resource: path.display().to_string(),
                message: format!("{e:#}"),
            })?;
        }
        Ok(())
    }

    fn play_feedback(&mut self, _audio: &Path) {
        self.audio.play();
    }

    fn feedback_playing(&self) -> bool {
        self.audio.is_playing()
    }

    fn export(
        &mut self,
        request: &SaveRequest,
        outcomes: &[TrialOutcome],
    ) -> Result<(), ExportError> {
        self.exporter.export(request, outcomes).map(|_| ())
    }
}
