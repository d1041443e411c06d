use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A decoded mono clip.
#[derive(Debug, Clone)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader =
            hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<_, _>>()?
            }
        };
        let channels = spec.channels.max(1) as usize;
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Nearest-sample conversion to `rate`.
    pub fn resampled(&self, rate: u32) -> Vec<f32> {
        if rate == self.sample_rate || self.samples.is_empty() {
            return self.samples.clone();
        }
        let step = self.sample_rate as f64 / rate as f64;
        let len = (self.samples.len() as f64 / step) as usize;
        (0..len)
            .map(|i| self.samples[((i as f64 * step) as usize).min(self.samples.len() - 1)])
            .collect()
    }
}

struct Output {
    _stream: cpal::Stream,
    /// Next sample to play; `len` when idle.
    position: Arc<AtomicUsize>,
    len: usize,
}

enum Backend {
    Device(Output),
    /// No output device: playback is a timer of the clip's length.
    Silent {
        length: Duration,
        until: Option<Instant>,
    },
}

/// Plays the incorrect-response cue. Nothing plays until [`load`] succeeds.
///
/// [`load`]: FeedbackPlayer::load
#[derive(Default)]
pub struct FeedbackPlayer {
    backend: Option<Backend>,
}

impl FeedbackPlayer {
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if self.backend.is_some() {
            return Ok(());
        }
        let clip = Clip::load(path)?;
        info!(
            path = %path.display(),
            duration_ms = clip.duration().as_millis() as u64,
            "feedback audio loaded"
        );
        let backend = match open_output(&clip) {
            Ok(output) => Backend::Device(output),
            Err(e) => {
                warn!(error = %e, "no audio output; feedback will be silent");
                Backend::Silent {
                    length: clip.duration(),
                    until: None,
                }
            }
        };
        self.backend = Some(backend);
        Ok(())
    }

    pub fn play(&mut self) {
        match &mut self.backend {
            Some(Backend::Device(out)) => out.position.store(0, Ordering::Release),
            Some(Backend::Silent { length, until }) => *until = Some(Instant::now() + *length),
            None => warn!("feedback requested before audio was loaded"),
        }
    }

    pub fn is_playing(&self) -> bool {
        match &self.backend {
            Some(Backend::Device(out)) => out.position.load(Ordering::Acquire) < out.len,
            Some(Backend::Silent { until, .. }) => until.is_some_and(|t| Instant::now() < t),
            None => false,
        }
    }
}

fn open_output(clip: &Clip) -> Result<Output> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))?;
    let supported = device.default_output_config()?;
    let config = cpal::StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let samples = Arc::new(clip.resampled(config.sample_rate.0));
    let len = samples.len();
    let position = Arc::new(AtomicUsize::new(len));

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, samples, Arc::clone(&position))?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, samples, Arc::clone(&position))?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, samples, Arc::clone(&position))?,
        other => return Err(anyhow!("unsupported sample format {other:?}")),
    };
    stream.play()?;
    debug!(
        rate = config.sample_rate.0,
        channels = config.channels,
        "audio output opened"
    );

    Ok(Output {
        _stream: stream,
        position,
        len,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Arc<Vec<f32>>,
    position: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let start = position.load(Ordering::Acquire);
            let mut pos = start;
            for frame in data.chunks_mut(channels) {
                let s = samples.get(pos).copied().unwrap_or(0.0);
                if pos < samples.len() {
                    pos += 1;
                }
                for out in frame.iter_mut() {
                    *out = T::from_sample(s);
                }
            }
            // A `play` that landed during this callback keeps its restart.
            let _ = position.compare_exchange(start, pos, Ordering::AcqRel, Ordering::Acquire);
        },
        |err| warn!(error = %err, "audio stream error"),
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            w.write_sample(i16::MAX / 2).unwrap();
            w.write_sample(0i16).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn decodes_and_downmixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cue.wav");
        write_wav(&path, 8000, 4000);
        let clip = Clip::load(&path).unwrap();
        assert_eq!(clip.samples.len(), 4000);
        assert_eq!(clip.duration(), Duration::from_millis(500));
        assert!((clip.samples[0] - 0.25).abs() < 0.01);
    }

    #[test]
    fn resamples_by_rate_ratio() {
        let clip = Clip {
            samples: vec![0.0; 100],
            sample_rate: 10,
        };
        assert_eq!(clip.resampled(20).len(), 200);
        assert_eq!(clip.resampled(5).len(), 50);
        assert_eq!(clip.resampled(10).len(), 100);
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut player = FeedbackPlayer::default();
        assert!(player.load(Path::new("/nonexistent/cue.wav")).is_err());
        assert!(!player.is_playing());
    }
}
