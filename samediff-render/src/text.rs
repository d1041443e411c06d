use ab_glyph::{point, Font, FontArc, Glyph, PxScale, ScaleFont};
use samediff_core::Atom;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};

pub const TEXT_COLOR: Color = Color::WHITE;

/// Rasterised lines of one font size, keyed by their text.
pub struct TextCache {
    font: FontArc,
    size_px: f32,
    map: HashMap<Atom, Arc<Pixmap>>,
}

impl TextCache {
    pub fn new(font: FontArc, size_px: f32) -> Self {
        Self {
            font,
            size_px,
            map: HashMap::new(),
        }
    }

    pub fn size_px(&self) -> f32 {
        self.size_px
    }

    pub fn line_height(&self) -> f32 {
        self.size_px * 1.4
    }

    /// `None` for text with no visible glyphs.
    pub fn get_or_render(&mut self, text: &str) -> Option<Arc<Pixmap>> {
        let atom = Atom::from(text);
        if let Some(p) = self.map.get(&atom) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(text, self.size_px, &self.font, TEXT_COLOR)?);
        self.map.insert(atom, Arc::clone(&pm));
        Some(pm)
    }

    pub fn wrap(&self, text: &str, max_width: f32) -> Vec<String> {
        wrap_text(&self.font, self.size_px, text, max_width)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Horizontal advance of `text` at `font_size`, kerning included.
pub fn measure_text<F: Font>(font: &F, font_size: f32, text: &str) -> f32 {
    let sf = font.as_scaled(PxScale::from(font_size));
    let mut width = 0.0;
    let mut prev = None;
    for ch in text.chars() {
        let id = sf.glyph_id(ch);
        if let Some(p) = prev {
            width += sf.kern(p, id);
        }
        width += sf.h_advance(id);
        prev = Some(id);
    }
    width
}

/// Greedy word wrap. A single word wider than `max_width` gets its own line.
pub fn wrap_text<F: Font>(font: &F, font_size: f32, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure_text(font, font_size, &candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    color: Color,
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // Layout with baseline at ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }
    if outlines.is_empty() {
        return None;
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;

    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();
    let cu = color.to_color_u8();

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // Porter-Duff over in premultiplied space
            let a = (cov * cu.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let inv = 1.0 - a;
            let bg = dst[i];
            let over = |s: u8, d: u8| ((s as f32 * a) as u8).saturating_add((d as f32 * inv) as u8);
            let r = over(cu.red(), bg.red());
            let g = over(cu.green(), bg.green());
            let bl = over(cu.blue(), bg.blue());
            let al = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(al), g.min(al), bl.min(al), al) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}
