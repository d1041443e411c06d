use crate::images::ImageStore;
use crate::text::TextCache;
use ab_glyph::FontArc;
use anyhow::{bail, Context, Result};
use bytemuck::{cast_slice, cast_slice_mut};
use samediff_core::{Display, TextScreen};
use samediff_timing::{FrameTimes, Timer};
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{Color, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::warn;

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const FRAME_GREY: u8 = 160;

/// Where the two image slots sit on a canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    /// Side of each square slot.
    pub slot: u32,
    pub left: (f32, f32),
    pub right: (f32, f32),
}

impl Layout {
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let slot = (w * 0.3).min(h * 0.5).max(8.0);
        let offset = w * 0.2;
        Self {
            width,
            height,
            slot: slot as u32,
            left: (w * 0.5 - offset, h * 0.5),
            right: (w * 0.5 + offset, h * 0.5),
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 * 0.5, self.height as f32 * 0.5)
    }

    pub fn slot_size(&self) -> (u32, u32) {
        (self.slot, self.slot)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
    /// `false` when the display was unchanged and nothing was touched.
    pub redrawn: bool,
}

struct Fonts {
    title: TextCache,
    body: TextCache,
}

pub struct SkiaRenderer {
    layout: Layout,

    fixation: Arc<Pixmap>,
    slot_frame: Arc<Pixmap>,
    fonts: Option<Fonts>,

    canvas: Pixmap,
    dirty_regions: Vec<Rect>,
    first_frame: bool,
    shown: Option<Display>,
    clear_buffer: Vec<u8>,

    draw_times: FrameTimes,
}

impl SkiaRenderer {
    /// Without a font, text screens are left blank.
    pub fn new(width: u32, height: u32, font: Option<FontArc>) -> Result<Self> {
        let layout = Layout::new(width, height);
        let fonts = font.map(|f| Fonts {
            title: TextCache::new(f.clone(), 40.0),
            body: TextCache::new(f, 26.0),
        });
        if fonts.is_none() {
            warn!("renderer has no font; text will not be drawn");
        }
        Ok(Self {
            layout,
            fixation: Arc::new(fixation_cross(40)?),
            slot_frame: Arc::new(slot_frame(layout.slot)?),
            fonts,
            canvas: blank_canvas(width, height)?,
            dirty_regions: Vec::with_capacity(16),
            first_frame: true,
            shown: None,
            clear_buffer: clear_buffer(width, height),
            draw_times: FrameTimes::default(),
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.layout = Layout::new(width, height);
        self.slot_frame = Arc::new(slot_frame(self.layout.slot)?);
        self.canvas = blank_canvas(width, height)?;
        self.clear_buffer = clear_buffer(width, height);
        self.dirty_regions.clear();
        self.first_frame = true;
        Ok(())
    }

    /// Rolling statistics over the draw step of recent redraws.
    pub fn draw_timing(&self) -> Option<samediff_timing::FrameStats> {
        self.draw_times.stats()
    }

    /// Draws `display` into `frame_buffer` (RGBA, canvas-sized). Frames
    /// whose display matches the previous frame are skipped.
    pub fn render_frame<T: Timer>(
        &mut self,
        display: &Display,
        images: &ImageStore,
        frame_buffer: &mut [u8],
        timer: &T,
    ) -> Result<FrameStats> {
        if frame_buffer.len() != self.clear_buffer.len() {
            bail!(
                "frame buffer is {} bytes, canvas needs {}",
                frame_buffer.len(),
                self.clear_buffer.len()
            );
        }
        let unchanged = self.shown.as_ref() == Some(display);
        if unchanged && !self.first_frame {
            return Ok(FrameStats::default());
        }

        if self.first_frame {
            self.first_frame = false;
            self.canvas.data_mut().copy_from_slice(&self.clear_buffer);
            frame_buffer.copy_from_slice(&self.clear_buffer);
            self.dirty_regions.clear();
        }

        let old_dirty = std::mem::take(&mut self.dirty_regions);
        let t_clear = {
            let t = timer.now();
            self.clear_dirty(&old_dirty);
            timer.elapsed(t)
        };

        let t_draw = {
            let t = timer.now();
            self.draw(display, images);
            timer.elapsed(t)
        };

        let mut present = old_dirty;
        present.extend_from_slice(&self.dirty_regions);
        coalesce_dirty(&mut present);
        let t_copy = {
            let t = timer.now();
            for rect in &present {
                self.copy_dirty_region(*rect, frame_buffer);
            }
            timer.elapsed(t)
        };

        self.draw_times.record(t_draw);
        self.shown = Some(display.clone());

        Ok(FrameStats {
            clear: t_clear,
            draw: t_draw,
            copy: t_copy,
            total: t_clear + t_draw + t_copy,
            dirty_count: self.dirty_regions.len(),
            redrawn: true,
        })
    }

    fn draw(&mut self, display: &Display, images: &ImageStore) {
        let layout = self.layout;
        match display {
            Display::Blank => {}
            Display::Fixation => {
                let cross = Arc::clone(&self.fixation);
                self.blit(&cross, layout.center());
            }
            Display::Placeholder => {
                let frame = Arc::clone(&self.slot_frame);
                self.blit(&frame, layout.left);
                self.blit(&frame, layout.right);
            }
            Display::ImagePair { left, right } => {
                for (name, pos) in [(left, layout.left), (right, layout.right)] {
                    match images.get(name) {
                        Some(pm) => self.blit(&pm, pos),
                        None => {
                            warn!(image = %name, "image was not preloaded");
                            let frame = Arc::clone(&self.slot_frame);
                            self.blit(&frame, pos);
                        }
                    }
                }
            }
            Display::Text(screen) => self.draw_text_screen(screen),
        }
    }

    fn draw_text_screen(&mut self, screen: &TextScreen) {
        let Some(fonts) = self.fonts.as_mut() else {
            return;
        };
        let max_width = self.layout.width as f32 * 0.8;

        // (pixmap, line height) per line, blank entries for paragraph gaps
        let mut lines: Vec<(Option<Arc<Pixmap>>, f32)> = Vec::new();
        if let Some(title) = &screen.title {
            for line in fonts.title.wrap(title, max_width) {
                lines.push((fonts.title.get_or_render(&line), fonts.title.line_height()));
            }
            lines.push((None, fonts.body.line_height()));
        }
        for paragraph in &screen.paragraphs {
            for line in fonts.body.wrap(paragraph, max_width) {
                lines.push((fonts.body.get_or_render(&line), fonts.body.line_height()));
            }
            lines.push((None, fonts.body.line_height() * 0.5));
        }
        if let Some(prompt) = &screen.prompt {
            lines.push((None, fonts.body.line_height()));
            for line in fonts.body.wrap(prompt, max_width) {
                lines.push((fonts.body.get_or_render(&line), fonts.body.line_height()));
            }
        }

        let total: f32 = lines.iter().map(|(_, h)| h).sum();
        let (cx, cy) = self.layout.center();
        let mut y = (cy - total * 0.5).max(0.0);
        for (pm, h) in lines {
            if let Some(pm) = pm {
                self.blit(&pm, (cx, y + h * 0.5));
            }
            y += h;
        }
    }

    /// Premultiplied source-over of `pm` centred at `pos`.
    fn blit(&mut self, pm: &Pixmap, pos: (f32, f32)) {
        let (w, h) = (pm.width() as i32, pm.height() as i32);
        let (cw, ch) = (self.canvas.width() as i32, self.canvas.height() as i32);
        let x = (pos.0 - w as f32 * 0.5).floor() as i32;
        let y = (pos.1 - h as f32 * 0.5).floor() as i32;

        if x + w <= 0 || y + h <= 0 || x >= cw || y >= ch {
            return;
        }

        let dst_x = x.max(0) as usize;
        let dst_y = y.max(0) as usize;
        let src_x = (-x).max(0) as usize;
        let src_y = (-y).max(0) as usize;
        let copy_w = (w as usize - src_x).min(cw as usize - dst_x);
        let copy_h = (h as usize - src_y).min(ch as usize - dst_y);

        let src: &[[u8; 4]] = cast_slice(pm.data());
        let src_stride = pm.width() as usize;
        let dst_stride = cw as usize;
        let dst: &mut [[u8; 4]] = cast_slice_mut(self.canvas.data_mut());

        let fully_opaque = (0..copy_h).all(|row| {
            let start = (src_y + row) * src_stride + src_x;
            src[start..start + copy_w].iter().all(|p| p[3] == 255)
        });

        for row in 0..copy_h {
            let s = (src_y + row) * src_stride + src_x;
            let d = (dst_y + row) * dst_stride + dst_x;
            let (src_row, dst_row) = (&src[s..s + copy_w], &mut dst[d..d + copy_w]);
            if fully_opaque {
                dst_row.copy_from_slice(src_row);
                continue;
            }
            for (dp, sp) in dst_row.iter_mut().zip(src_row) {
                let inv = 255 - sp[3] as u32;
                for c in 0..4 {
                    dp[c] = (sp[c] as u32 + (dp[c] as u32 * inv + 127) / 255).min(255) as u8;
                }
            }
        }

        if let Some(r) =
            Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
        {
            self.dirty_regions.push(r);
        }
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let (w, h) = (self.layout.width, self.layout.height);
        let stride = w as usize * 4;
        let canvas = self.canvas.data_mut();
        for rect in dirty {
            let Some((x0, y0, x1, y1)) = pixel_bounds(*rect, w, h) else {
                continue;
            };
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                let len = (x1 - x0) * 4;
                canvas[off..off + len].copy_from_slice(&self.clear_buffer[off..off + len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: Rect, frame_buffer: &mut [u8]) {
        let (w, h) = (self.layout.width, self.layout.height);
        let Some((x0, y0, x1, y1)) = pixel_bounds(dirty, w, h) else {
            return;
        };
        let stride = w as usize * 4;
        let canvas = self.canvas.data();
        for y in y0..y1 {
            let off = y * stride + x0 * 4;
            let len = (x1 - x0) * 4;
            frame_buffer[off..off + len].copy_from_slice(&canvas[off..off + len]);
        }
    }
}

fn pixel_bounds(rect: Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let (w, h) = (width as f32, height as f32);
    let x0 = rect.x().floor().clamp(0.0, w) as usize;
    let y0 = rect.y().floor().clamp(0.0, h) as usize;
    let x1 = (rect.x() + rect.width()).ceil().clamp(0.0, w) as usize;
    let y1 = (rect.y() + rect.height()).ceil().clamp(0.0, h) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Merges rects that share a row band and touch horizontally.
fn coalesce_dirty(rects: &mut Vec<Rect>) {
    rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
    let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
    for r in rects.drain(..) {
        if let Some(last) = out.last_mut() {
            let same_row =
                (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
            let touching = r.x() <= last.x() + last.width() + 1.0;
            if same_row && touching {
                let nx = last.x().min(r.x());
                let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                    *last = merged;
                    continue;
                }
            }
        }
        out.push(r);
    }
    *rects = out;
}

fn clear_buffer(width: u32, height: u32) -> Vec<u8> {
    BACKGROUND
        .into_iter()
        .cycle()
        .take((width * height * 4) as usize)
        .collect()
}

fn blank_canvas(width: u32, height: u32) -> Result<Pixmap> {
    let mut canvas = Pixmap::new(width, height)
        .with_context(|| format!("invalid canvas size {width}x{height}"))?;
    canvas.fill(Color::from_rgba8(BACKGROUND[0], BACKGROUND[1], BACKGROUND[2], BACKGROUND[3]));
    Ok(canvas)
}

fn fixation_cross(size: u32) -> Result<Pixmap> {
    let mut pm = Pixmap::new(size, size).context("fixation pixmap")?;
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::WHITE);

    let s = size as f32;
    let bars = [
        Rect::from_xywh(0.0, (s - 4.0) * 0.5, s, 4.0),
        Rect::from_xywh((s - 4.0) * 0.5, 0.0, 4.0, s),
    ];
    for bar in bars.into_iter().flatten() {
        pm.fill_rect(bar, &paint, Transform::identity(), None);
    }
    Ok(pm)
}

/// Outlined empty box the size of an image slot.
fn slot_frame(side: u32) -> Result<Pixmap> {
    let mut pm = Pixmap::new(side, side).context("slot pixmap")?;
    let mut paint = Paint::default();
    paint.set_color_rgba8(FRAME_GREY, FRAME_GREY, FRAME_GREY, 255);
    let stroke = Stroke {
        width: 3.0,
        ..Stroke::default()
    };
    let s = side as f32;
    let path = Rect::from_xywh(1.5, 1.5, s - 3.0, s - 3.0)
        .map(PathBuilder::from_rect)
        .context("slot outline")?;
    pm.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    Ok(pm)
}
