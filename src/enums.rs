use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of media produced for one sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    AnimatedImage,
    #[default]
    Video,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::AnimatedImage => "gif",
            ArtifactKind::Video => "mp4",
        }
    }

    /// Recover the kind from an artifact path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("mp4") {
            Some(ArtifactKind::Video)
        } else if ext.eq_ignore_ascii_case("gif") {
            Some(ArtifactKind::AnimatedImage)
        } else {
            None
        }
    }
}

/// What to do with a frame that was left out of an artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipFrameDiagnostics {
    EmitStillImage,
    #[default]
    LogOnly,
}

/// Rescaling branch chosen from a sequence's peak sample value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitDepth {
    /// `peak < 256`, samples already fit 8 bits.
    Eight,
    /// `256 <= peak < 4096`.
    Twelve,
    /// Everything above, treated as 16-bit.
    Sixteen,
}

/// Where the frames of one sequence come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceSource {
    Folder(PathBuf),
    MultiFrameFile(PathBuf),
}

impl SequenceSource {
    pub fn path(&self) -> &Path {
        match self {
            SequenceSource::Folder(path) | SequenceSource::MultiFrameFile(path) => path,
        }
    }

    /// Name used for the artifact and in log lines.
    ///
    /// The full entry name is kept, extension included, so a folder `scan`
    /// and a file `scan.dcm` next to it get distinct artifacts.
    pub fn identifier(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sequence".to_string())
    }
}
