//! Pipeline configuration.
//!
//! Values come from [`PipelineConfig::default`], optionally overridden by a
//! JSON file and then by command-line flags.

use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::enums::{ArtifactKind, SkipFrameDiagnostics};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Frame rate must be a positive number, got {0}")]
    InvalidFrameRate(f32),

    #[error("Codec id must be exactly 4 ASCII characters, got {0:?}")]
    InvalidCodec(String),

    #[error("JPEG quality must be within 1..=100, got {0}")]
    InvalidQuality(u8),
}

/// Four-character codec identifier, e.g. `mjpg`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub const fn new(code: [u8; 4]) -> Self {
        Self(code)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl FromStr for FourCc {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| ConfigError::InvalidCodec(s.to_string()))?;
        if !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(ConfigError::InvalidCodec(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // construction only admits ASCII
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FourCc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn default_frame_rate() -> f32 {
    1.0
}

fn default_codec_id() -> FourCc {
    FourCc::new(*b"mjpg")
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_deck_file_name() -> String {
    "presentation.json".to_string()
}

/// Options recognised by the extractor, encoder and pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Animated image or video.
    pub artifact_kind: ArtifactKind,
    /// Playback rate in frames per second.
    pub frame_rate: f32,
    /// Video codec, ignored for animated images.
    pub codec_id: FourCc,
    pub skip_frame_diagnostics: SkipFrameDiagnostics,
    /// Quality of Motion-JPEG video samples.
    pub jpeg_quality: u8,
    /// Process sequences concurrently.
    pub parallel: bool,
    pub deck_file_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_kind: ArtifactKind::default(),
            frame_rate: default_frame_rate(),
            codec_id: default_codec_id(),
            skip_frame_diagnostics: SkipFrameDiagnostics::default(),
            jpeg_quality: default_jpeg_quality(),
            parallel: false,
            deck_file_name: default_deck_file_name(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file, missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        Ok(())
    }
}
