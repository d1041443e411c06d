use clap::Parser;
use samediff_experiment::{
    DirectorySink, DirectorySource, HttpSink, HttpSource, ResultExporter, RunParams,
    TrialListSource,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Same/different image-matching experiment")]
pub struct Args {
    /// Trial list number, 1-5. Anything else runs condition 1
    #[arg(long)]
    pub condition: Option<String>,

    /// Participant identifier used in the results filename
    #[arg(long = "subj-code")]
    pub subj_code: Option<String>,

    /// 1 swaps the response keys (/ = same, z = different)
    #[arg(long = "response-key-config")]
    pub response_key_config: Option<String>,

    /// Directory or http(s) base URL holding trial_lists/
    #[arg(long, default_value = ".")]
    pub trials: String,

    /// Directory that image names in the trial list resolve against
    #[arg(long, default_value = ".")]
    pub stimuli: PathBuf,

    /// Where results are written when no upload URL is given
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// POST results as JSON to this endpoint instead of writing locally
    #[arg(long)]
    pub upload_url: Option<String>,

    /// Give up on the upload after this many seconds
    #[arg(long)]
    pub upload_timeout_secs: Option<u64>,

    /// TrueType font for instructions
    #[arg(long, default_value = "assets/DejaVuSans.ttf")]
    pub font: PathBuf,

    /// Cue played after an incorrect response
    #[arg(long, default_value = "audio/incorrect.wav")]
    pub feedback_audio: PathBuf,

    /// Run in a window instead of borderless fullscreen
    #[arg(long, default_value_t = false)]
    pub windowed: bool,
}

impl Args {
    pub fn run_params(&self) -> RunParams {
        RunParams::resolve(
            self.condition.as_deref(),
            self.subj_code.as_deref(),
            self.response_key_config.as_deref(),
        )
    }

    pub fn trial_source(&self) -> Box<dyn TrialListSource> {
        if is_url(&self.trials) {
            Box::new(HttpSource::new(&self.trials))
        } else {
            Box::new(DirectorySource::new(&self.trials))
        }
    }

    pub fn exporter(&self) -> anyhow::Result<ResultExporter> {
        Ok(match &self.upload_url {
            Some(url) => {
                let timeout = self.upload_timeout_secs.map(Duration::from_secs);
                ResultExporter::new(HttpSink::new(url, timeout)?)
            }
            None => ResultExporter::new(DirectorySink::new(&self.data_dir)),
        })
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
