use crate::audio::FeedbackPlayer;
use crate::cli::Args;
use crate::services::Services;
use anyhow::{anyhow, bail, Result};
use samediff_core::{Display, TextScreen};
use samediff_experiment::{
    ExperimentConfig, ExperimentError, RunParams, RunnerEvent, TimelineBuilder, TrialRunner,
    load_trial_list,
};
use samediff_render::{FontArc, ImageStore, SkiaRenderer};
use samediff_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

/// Below this, waiting for a phase deadline is done by sleeping rather than
/// by another frame.
const SPIN_WINDOW: Duration = Duration::from_millis(2);

const FALLBACK_FONTS: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
];

enum RunState {
    Ready(TrialRunner<HighPrecisionTimer>),
    /// Nothing to run; the screen explains why.
    Failed(Display),
}

pub struct App {
    args: Args,
    timer: HighPrecisionTimer,
    state: RunState,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    services: Option<Services>,
    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,

    should_exit: bool,
}

impl App {
    /// Loads the trial list and builds the timeline. Failures don't return
    /// an error: they become the diagnostic screen the window shows.
    pub fn new(args: Args) -> Result<Self> {
        let params = args.run_params();
        info!(
            condition = params.condition.number(),
            participant = %params.participant,
            same_key = %params.keys.same_key,
            diff_key = %params.keys.diff_key,
            "run parameters"
        );
        let config = ExperimentConfig::new(params.keys).with_feedback_audio(&args.feedback_audio);
        let timer = HighPrecisionTimer::new();
        let state = match build_runner(&args, &config, &params, &timer) {
            Ok(runner) => RunState::Ready(runner),
            Err(e) => {
                error!(error = %e, "experiment cannot start");
                RunState::Failed(diagnostic(&e))
            }
        };

        Ok(Self {
            args,
            timer,
            state,
            window: None,
            pixels: None,
            renderer: None,
            services: None,
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "starting; ESC exits"
        );
        event_loop.run_app(&mut self).map_err(Into::into)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let mut window_attributes = Window::default_attributes()
            .with_title("samediff")
            .with_resizable(self.args.windowed);
        if !self.args.windowed {
            window_attributes = window_attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))));
        }

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.current_size = Some(physical_size);
        self.scale_factor = window.scale_factor();

        info!(
            width = physical_size.width,
            height = physical_size.height,
            scale_factor = format_args!("{:.2}", self.scale_factor),
            refresh_hz = ?self.refresh_rate,
            "display configuration"
        );

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);

        let font = optional_font(&self.args.font);
        let renderer = SkiaRenderer::new(physical_size.width, physical_size.height, font)?;
        let mut services = Services {
            images: ImageStore::new(&self.args.stimuli, renderer.layout().slot_size()),
            audio: FeedbackPlayer::default(),
            exporter: self.args.exporter()?,
        };

        if let RunState::Ready(runner) = &mut self.state {
            match runner.start(&mut services) {
                Ok(events) => self.log_events(&events),
                Err(e) => {
                    error!(error = %e, "preload failed");
                    self.state = RunState::Failed(diagnostic(&e));
                }
            }
        }

        self.renderer = Some(renderer);
        self.services = Some(services);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pix), Some(renderer), Some(services)) =
            (self.pixels.as_mut(), self.renderer.as_mut(), self.services.as_ref())
        else {
            return Ok(());
        };

        let display = match &self.state {
            RunState::Ready(runner) => runner.current_display().cloned().unwrap_or_default(),
            RunState::Failed(screen) => screen.clone(),
        };

        let stats = renderer.render_frame(
            &display,
            &services.images,
            pix.frame_mut(),
            &self.timer,
        )?;
        let now = self.timer.now();
        pix.render()?;
        let present = self.timer.elapsed(now);
        if let RunState::Ready(runner) = &mut self.state {
            runner.mark_presented();
        }

        if stats.redrawn {
            trace!(
                present_ms = present.as_secs_f64() * 1e3,
                clear_ms = stats.clear.as_secs_f64() * 1e3,
                draw_ms = stats.draw.as_secs_f64() * 1e3,
                copy_ms = stats.copy.as_secs_f64() * 1e3,
                dirty = stats.dirty_count,
                "frame"
            );
        }
        Ok(())
    }

    fn update(&mut self, event_loop: &ActiveEventLoop) {
        let (RunState::Ready(runner), Some(services)) = (&mut self.state, self.services.as_mut())
        else {
            return;
        };

        // Finish short waits here instead of on the next vsync.
        if let Some(left) = runner.time_to_deadline() {
            if left <= SPIN_WINDOW {
                self.timer.sleep(left);
            }
        }

        let result = runner.update(services);
        self.after_runner_step(result, event_loop);
    }

    fn handle_key(&mut self, key: &Key, event_loop: &ActiveEventLoop) {
        let pressed = match key {
            Key::Named(NamedKey::Escape) => {
                self.cleanup_and_exit(event_loop);
                return;
            }
            Key::Named(NamedKey::Space) => ' ',
            Key::Character(s) => match s.chars().next() {
                Some(c) => c,
                None => return,
            },
            _ => return,
        };

        let (RunState::Ready(runner), Some(services)) = (&mut self.state, self.services.as_mut())
        else {
            return;
        };
        let result = runner.handle_key(pressed, services);
        self.after_runner_step(result, event_loop);
    }

    fn after_runner_step(
        &mut self,
        result: Result<Vec<RunnerEvent>, ExperimentError>,
        event_loop: &ActiveEventLoop,
    ) {
        match result {
            Ok(events) => {
                self.log_events(&events);
                if events.contains(&RunnerEvent::Finished) {
                    self.cleanup_and_exit(event_loop);
                }
            }
            Err(e) => {
                error!(error = %e, "run stopped");
                self.state = RunState::Failed(diagnostic(&e));
            }
        }
    }

    fn log_events(&self, events: &[RunnerEvent]) {
        for event in events {
            match event {
                RunnerEvent::Exported { filename } => info!(%filename, "results saved"),
                RunnerEvent::TrialStarted { stage, number } => {
                    let of = match &self.state {
                        RunState::Ready(runner) => runner.trial_progress().map(|(_, of)| of),
                        RunState::Failed(_) => None,
                    };
                    debug!(stage = stage.label(), number, of = ?of, "trial");
                }
                RunnerEvent::ExportFailed { filename, message } => {
                    warn!(%filename, %message, "results were not saved")
                }
                other => debug!(event = ?other, "runner"),
            }
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                error!(error = %e, "failed to resize renderer");
            }
            // Placeholder boxes and the image pair share one slot size.
            if let Some(services) = &mut self.services {
                if let Err(e) = services.images.refit(renderer.layout().slot_size()) {
                    error!(error = %e, "failed to re-decode images for the new size");
                }
            }
        }
        info!(width = new_size.width, height = new_size.height, "display resized");
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        match &self.state {
            RunState::Ready(runner) if runner.is_finished() => {
                info!(responses = runner.results().len(), "experiment completed");
            }
            RunState::Ready(runner) if runner.is_started() => {
                warn!(
                    responses = runner.results().len(),
                    "run aborted before the save step; results were not exported"
                );
            }
            _ => {}
        }
        if let Some(stats) = self.renderer.as_ref().and_then(|r| r.draw_timing()) {
            debug!(
                mean_draw_ms = stats.average_frame_time_ns / 1e6,
                max_draw_ms = stats.max_frame_time_ns / 1e6,
                "render timing"
            );
        }
        self.should_exit = true;
        event_loop.exit();
    }
}

fn build_runner(
    args: &Args,
    config: &ExperimentConfig,
    params: &RunParams,
    timer: &HighPrecisionTimer,
) -> Result<TrialRunner<HighPrecisionTimer>, ExperimentError> {
    let source = args.trial_source();
    let trials = load_trial_list(source.as_ref(), config, params.condition)?;
    let timeline =
        TimelineBuilder::new(config).build(&trials, &params.participant, params.condition)?;
    Ok(TrialRunner::new(timeline, timer.clone()))
}

fn diagnostic(e: &ExperimentError) -> Display {
    let mut screen = TextScreen::new("The experiment could not start");
    if let ExperimentError::Load(load) = e {
        screen = screen.paragraph(format!("Resource: {}", load.resource()));
    }
    Display::Text(
        screen
            .paragraph(e.to_string())
            .prompt("Please tell the experimenter. Press ESC to close."),
    )
}

/// The first readable, parseable font among `preferred` and the fallbacks.
fn load_font(preferred: &Path) -> Result<FontArc> {
    let candidates =
        std::iter::once(preferred.to_path_buf()).chain(FALLBACK_FONTS.iter().map(PathBuf::from));
    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                info!(font = %path.display(), "font loaded");
                return Ok(font);
            }
            Err(e) => warn!(font = %path.display(), error = %e, "not a usable font"),
        }
    }
    bail!("no font found at {} or any fallback location", preferred.display())
}

/// A missing font leaves text screens blank but still lets the window open.
fn optional_font(preferred: &Path) -> Option<FontArc> {
    match load_font(preferred) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!(error = %e, "continuing without a font");
            None
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(error = %e, "failed to create window and surface");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    error!(error = %e, "render failed");
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                self.update(event_loop);
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed() && !event.repeat =>
            {
                self.handle_key(&event.logical_key, event_loop);
            }
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_font_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();

        let fallback_present = FALLBACK_FONTS.iter().any(|p| Path::new(p).is_file());
        assert_eq!(optional_font(&bogus).is_some(), fallback_present);
        assert_eq!(
            optional_font(&dir.path().join("missing.ttf")).is_some(),
            fallback_present
        );
    }

    #[test]
    fn renderer_without_font_still_builds() {
        assert!(SkiaRenderer::new(320, 200, optional_font(Path::new("/nonexistent.ttf"))).is_ok());
    }
}
