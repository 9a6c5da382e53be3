use crate::{
    decoder::{DecodeError, Decoded, FrameDecoder},
    enums::{BitDepth, SequenceSource},
    frame::{NormalizedFrame, RawFrame},
};

use log::{debug, warn};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Added after the 8-bit shift of 16-bit data so mid-range tissue does not
/// collapse towards black.
pub const HIGH_DEPTH_OFFSET: u16 = 128;

/// Peak reported for a sequence without frames.
pub const EMPTY_PEAK: u16 = 1;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

impl BitDepth {
    /// Pick the rescaling branch for a sequence-wide peak sample value.
    pub fn from_peak(peak: u16) -> Self {
        match peak {
            0..=255 => BitDepth::Eight,
            256..=4095 => BitDepth::Twelve,
            _ => BitDepth::Sixteen,
        }
    }

    #[inline]
    pub fn rescale(self, sample: u16) -> u8 {
        let value = match self {
            BitDepth::Eight => sample,
            BitDepth::Twelve => sample >> 4,
            BitDepth::Sixteen => (sample >> 8) + HIGH_DEPTH_OFFSET,
        };
        value.min(u16::from(u8::MAX)) as u8
    }
}

/// Frames of one sequence after bit-depth normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSequence {
    pub frames: Vec<NormalizedFrame>,
    pub peak: u16,
    pub bit_depth: BitDepth,
}

impl ExtractedSequence {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Largest sample over all frames, [`EMPTY_PEAK`] when there is none.
pub fn peak(frames: &[RawFrame]) -> u16 {
    frames
        .iter()
        .filter_map(|frame| frame.iter().copied().max())
        .max()
        .unwrap_or(EMPTY_PEAK)
}

/// Rescale every frame with one sequence-wide branch so brightness stays
/// comparable between frames.
pub fn normalize(frames: &[RawFrame]) -> ExtractedSequence {
    let peak = peak(frames);
    let bit_depth = BitDepth::from_peak(peak);
    let frames = frames
        .par_iter()
        .map(|frame| frame.mapv(|v| bit_depth.rescale(v)))
        .collect();
    ExtractedSequence {
        frames,
        peak,
        bit_depth,
    }
}

/// Reads a sequence source and produces its normalized frames.
pub struct SequenceExtractor<D> {
    decoder: D,
}

impl<D: FrameDecoder> SequenceExtractor<D> {
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// Extract and normalize all frames of a sequence.
    ///
    /// Items without pixel data are left out. A source without any frame
    /// gives an empty sequence, not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the folder cannot be listed or any item fails to decode
    pub fn extract(&self, source: &SequenceSource) -> Result<ExtractedSequence, ExtractError> {
        let raw_frames = self.read_raw_frames(source)?;
        let sequence = normalize(&raw_frames);
        debug!(
            "{}: {} frames, peak {} -> {:?}",
            source.identifier(),
            sequence.frames.len(),
            sequence.peak,
            sequence.bit_depth
        );
        Ok(sequence)
    }

    /// Decode every item of the source in order, without rescaling.
    pub fn read_raw_frames(&self, source: &SequenceSource) -> Result<Vec<RawFrame>, ExtractError> {
        let items = match source {
            SequenceSource::Folder(folder) => Self::list_items(folder)?,
            SequenceSource::MultiFrameFile(path) => vec![path.clone()],
        };

        let mut frames = Vec::new();
        for path in items {
            match self.decoder.decode(&path) {
                Ok(Decoded::Frames(decoded)) => frames.extend(decoded),
                Ok(Decoded::NoPixelData) => debug!("{} has no pixel data", path.display()),
                Err(source) => return Err(ExtractError::Decode { path, source }),
            }
        }
        Ok(frames)
    }

    /// Files of a folder sorted by name, subdirectories are not descended into.
    ///
    /// Symbolic links are followed. Hidden entries are left out.
    fn list_items(folder: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(folder)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            match fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => paths.push(path),
                Ok(_) => {}
                Err(err) => warn!("Ignoring {}: {err}", path.display()),
            }
        }
        paths.sort();
        Ok(paths)
    }
}
