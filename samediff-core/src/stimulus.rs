use crate::Atom;
use std::collections::HashSet;
use std::path::PathBuf;

/// What the screen shows during a phase
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Display {
    #[default]
    Blank,
    Fixation,
    /// Two empty boxes in the same slots an `ImagePair` uses.
    Placeholder,
    ImagePair {
        left: Atom,
        right: Atom,
    },
    Text(TextScreen),
}

/// A full-screen message: instructions, transition, debrief or diagnostics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextScreen {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
    pub prompt: Option<String>,
}

impl TextScreen {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn paragraph(mut self, text: impl Into<String>) -> Self {
        self.paragraphs.push(text.into());
        self
    }

    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.prompt = Some(text.into());
        self
    }
}

/// Everything that has to be loaded before the first trial starts
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreloadManifest {
    pub images: Vec<Atom>,
    pub audio: Vec<PathBuf>,
}

impl PreloadManifest {
    /// Adds each image once, keeping first-seen order.
    pub fn collect_images<'a>(images: impl IntoIterator<Item = &'a Atom>) -> Vec<Atom> {
        let mut seen = HashSet::new();
        images
            .into_iter()
            .filter(|img| seen.insert((*img).clone()))
            .cloned()
            .collect()
    }
}
