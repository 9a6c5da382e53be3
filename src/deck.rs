//! Slide deck assembled from finished artifacts, one slide per sequence.

use crate::enums::ArtifactKind;

use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot serialize deck: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideKind {
    Picture,
    Movie,
}

/// Position and size of the media on a slide, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            left: 1.0,
            top: 1.0,
            width: 8.5,
            height: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub kind: SlideKind,
    pub media: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub placement: Placement,
}

impl Slide {
    /// Build the slide for an artifact; videos become movies, anything else a picture.
    pub fn for_artifact(path: &Path) -> Self {
        let (kind, mime_type) = match ArtifactKind::from_path(path) {
            Some(ArtifactKind::Video) => (SlideKind::Movie, Some("video/mp4".to_string())),
            _ => (SlideKind::Picture, None),
        };
        Self {
            kind,
            media: path.to_path_buf(),
            mime_type,
            placement: Placement::default(),
        }
    }
}

/// Places media files onto slides and saves the result.
pub trait DeckBuilder {
    fn add_slide(&mut self, media: &Path);

    /// # Errors
    ///
    /// Returns error if the deck cannot be written to `path`
    fn save(&self, path: &Path) -> Result<(), DeckError>;
}

/// Deck written as a JSON manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonDeck {
    pub slides: Vec<Slide>,
}

impl JsonDeck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_artifacts<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut deck = Self::new();
        for path in paths {
            deck.add_slide(path.as_ref());
        }
        deck
    }
}

impl DeckBuilder for JsonDeck {
    fn add_slide(&mut self, media: &Path) {
        self.slides.push(Slide::for_artifact(media));
    }

    fn save(&self, path: &Path) -> Result<(), DeckError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_kind_follows_extension() {
        let deck = JsonDeck::from_artifacts(&["out/a.mp4", "out/b.gif", "out/c.MP4"]);
        let kinds: Vec<_> = deck.slides.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SlideKind::Movie, SlideKind::Picture, SlideKind::Movie]);
        assert_eq!(deck.slides[0].mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(deck.slides[1].mime_type, None);
        assert_eq!(deck.slides[1].placement, Placement::default());
    }

    #[test]
    fn saved_deck_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presentation.json");
        let deck = JsonDeck::from_artifacts(&["x.gif", "y.mp4"]);
        deck.save(&path).unwrap();

        let loaded: JsonDeck =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, deck);
    }

    #[test]
    fn empty_deck_is_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presentation.json");
        JsonDeck::new().save(&path).unwrap();
        assert!(path.exists());
    }
}
