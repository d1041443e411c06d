use anyhow::{Context, Result};
use image::imageops::FilterType;
use samediff_core::Atom;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::{ColorU8, Pixmap};
use tracing::{debug, info};

/// Decoded stimulus images, scaled to fit one image slot.
pub struct ImageStore {
    root: PathBuf,
    slot: (u32, u32),
    images: HashMap<Atom, Arc<Pixmap>>,
}

impl ImageStore {
    /// Image names resolve relative to `root`.
    pub fn new(root: impl Into<PathBuf>, slot: (u32, u32)) -> Self {
        Self {
            root: root.into(),
            slot,
            images: HashMap::new(),
        }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Decodes `name` unless it is already loaded.
    pub fn load(&mut self, name: &Atom) -> Result<()> {
        if self.images.contains_key(name) {
            return Ok(());
        }
        let path = self.path_of(name);
        let pm = decode(&path, self.slot)?;
        debug!(image = %name, width = pm.width(), height = pm.height(), "decoded");
        self.images.insert(name.clone(), Arc::new(pm));
        Ok(())
    }

    /// Stops at the first image that fails.
    pub fn load_all<'a>(&mut self, names: impl IntoIterator<Item = &'a Atom>) -> Result<usize> {
        let mut n = 0;
        for name in names {
            self.load(name)?;
            n += 1;
        }
        info!(images = n, root = %self.root.display(), "images decoded");
        Ok(n)
    }

    /// Changes the slot size and re-decodes every loaded image to fit it.
    pub fn refit(&mut self, slot: (u32, u32)) -> Result<usize> {
        if slot == self.slot {
            return Ok(0);
        }
        let names: Vec<Atom> = self.images.keys().cloned().collect();
        self.slot = slot;
        self.images.clear();
        self.load_all(&names)
    }

    pub fn insert(&mut self, name: impl Into<Atom>, pixmap: Pixmap) {
        self.images.insert(name.into(), Arc::new(pixmap));
    }

    pub fn get(&self, name: &Atom) -> Option<Arc<Pixmap>> {
        self.images.get(name).cloned()
    }

    pub fn contains(&self, name: &Atom) -> bool {
        self.images.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Decodes to premultiplied RGBA, resized to fit within `fit` keeping aspect.
pub fn decode(path: &Path, fit: (u32, u32)) -> Result<Pixmap> {
    let img = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    let rgba = img.resize(fit.0.max(1), fit.1.max(1), FilterType::Triangle).to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut pm = Pixmap::new(w, h).with_context(|| format!("{} is empty", path.display()))?;
    for (dst, px) in pm.pixels_mut().iter_mut().zip(rgba.pixels()) {
        *dst = ColorU8::from_rgba(px[0], px[1], px[2], px[3]).premultiply();
    }
    Ok(pm)
}
