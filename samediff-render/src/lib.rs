mod images;
mod render;
mod text;

pub use images::{decode, ImageStore};
pub use render::{FrameStats, Layout, SkiaRenderer};
pub use text::{measure_text, render_text_pixmap, wrap_text, TextCache};

pub use ab_glyph::FontArc;
