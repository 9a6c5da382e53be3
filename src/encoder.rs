//! Media encoder: turns the normalized frames of one sequence into a single
//! animated image or video file.
//!
//! Encoding runs in two phases. Frames are first checked against the shape of
//! frame 0; frames with another shape are reported as [`SkippedFrame`]s and
//! never reach the codec. The conforming frames are then written, in order,
//! through one [`FrameSink`] session. A frame that fails to write is recorded
//! as a [`FrameWriteFailure`] and the session carries on with the next one.

use crate::{
    config::{FourCc, PipelineConfig},
    enums::{ArtifactKind, SkipFrameDiagnostics},
    frame::{NormalizedFrame, Shape, sample_range, to_gray_image},
    gif_sink::GifSink,
    mp4_sink::{Mp4Sink, VideoCodec},
};

use log::{info, warn};
use ndarray::ArrayView2;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Cannot open {path} for writing: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec {0} is not available")]
    UnsupportedCodec(FourCc),

    #[error("Frame size {0} is not supported by the codec")]
    UnsupportedSize(Shape),

    #[error("No frames to encode")]
    NoFrames,

    #[error("None of the {0} frames could be written")]
    NothingWritten(usize),

    #[error("Session was closed after a failed write")]
    SessionClosed,

    #[error("{0} was not completely written")]
    Incomplete(PathBuf),

    #[error("Frame has shape {actual}, session expects {expected}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("Artifact exceeds the container size limit")]
    ContainerFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl EncodeError {
    /// Whether the error prevented an encoder session from starting.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            EncodeError::Open { .. } | EncodeError::UnsupportedCodec(_) | EncodeError::UnsupportedSize(_)
        )
    }
}

/// An open encoder session appending frames to one artifact.
///
/// Dropping a session without calling [`FrameSink::finish`] closes the file.
pub trait FrameSink {
    /// # Errors
    ///
    /// Returns error if this frame could not be appended; the session stays usable
    fn write_frame(&mut self, frame: ArrayView2<'_, u8>) -> Result<(), EncodeError>;

    /// Flush outstanding data and close the artifact.
    fn finish(self: Box<Self>) -> Result<(), EncodeError>;
}

/// A finished artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// Frames actually written.
    pub frame_count: usize,
}

/// Frame left out of an artifact because its shape differs from frame 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFrame {
    pub sequence: String,
    pub index: usize,
    pub shape: Shape,
    /// Diagnostic still image, when requested and written.
    pub still_image: Option<PathBuf>,
}

/// Frame the open session failed to append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameWriteFailure {
    pub sequence: String,
    pub index: usize,
    pub min: u8,
    pub max: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeReport {
    pub artifact: MediaArtifact,
    pub skipped: Vec<SkippedFrame>,
    pub write_failures: Vec<FrameWriteFailure>,
}

/// Partition of a sequence into frames to encode and frames to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    pub reference: Shape,
    /// Indices matching `reference`, in sequence order. Always starts with 0.
    pub conforming: Vec<usize>,
    pub skipped: Vec<(usize, Shape)>,
}

impl FramePlan {
    /// `None` for an empty sequence.
    pub fn new(frames: &[NormalizedFrame]) -> Option<Self> {
        let reference = Shape::of(&frames.first()?.view());
        let mut conforming = Vec::with_capacity(frames.len());
        let mut skipped = Vec::new();
        for (index, frame) in frames.iter().enumerate() {
            let shape = Shape::of(&frame.view());
            if shape == reference {
                conforming.push(index);
            } else {
                skipped.push((index, shape));
            }
        }
        Some(Self {
            reference,
            conforming,
            skipped,
        })
    }
}

/// Write the listed frames in order, recovering from single frame failures.
///
/// Returns the number of frames written and the failures.
pub fn write_frames(
    sink: &mut dyn FrameSink,
    sequence: &str,
    frames: &[NormalizedFrame],
    indices: &[usize],
) -> (usize, Vec<FrameWriteFailure>) {
    let mut written = 0;
    let mut failures = Vec::new();
    for &index in indices {
        let frame = frames[index].view();
        match sink.write_frame(frame) {
            Ok(()) => written += 1,
            Err(err) => {
                let (min, max) = sample_range(&frame).unwrap_or((0, 0));
                warn!("{sequence}: frame {index} failed to write: {err} (min {min}, max {max})");
                failures.push(FrameWriteFailure {
                    sequence: sequence.to_string(),
                    index,
                    min,
                    max,
                    reason: err.to_string(),
                });
            }
        }
    }
    (written, failures)
}

/// Write the listed frames and close the session.
///
/// # Errors
///
/// Returns error if not a single frame was written or the session cannot be
/// closed; the artifact is then unusable
pub fn write_session(
    mut sink: Box<dyn FrameSink>,
    sequence: &str,
    frames: &[NormalizedFrame],
    indices: &[usize],
) -> Result<(usize, Vec<FrameWriteFailure>), EncodeError> {
    let (written, failures) = write_frames(sink.as_mut(), sequence, frames, indices);
    if written == 0 {
        return Err(EncodeError::NothingWritten(failures.len()));
    }
    sink.finish()?;
    Ok((written, failures))
}

pub struct MediaEncoder<'a> {
    config: &'a PipelineConfig,
}

impl<'a> MediaEncoder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    pub fn artifact_path(&self, output_dir: &Path, sequence: &str) -> PathBuf {
        output_dir.join(format!(
            "{sequence}.{}",
            self.config.artifact_kind.extension()
        ))
    }

    /// Path of the diagnostic still image for a skipped frame.
    pub fn still_image_path(output_dir: &Path, sequence: &str, index: usize) -> PathBuf {
        output_dir.join(format!("{sequence}.skipped.{index}.png"))
    }

    /// Start an encoder session for frames of `shape`.
    ///
    /// # Errors
    ///
    /// Returns error if the codec is unavailable, the frame size is not
    /// supported or the file cannot be created
    pub fn open_sink(&self, path: &Path, shape: Shape) -> Result<Box<dyn FrameSink>, EncodeError> {
        match self.config.artifact_kind {
            ArtifactKind::AnimatedImage => Ok(Box::new(GifSink::create(
                path,
                shape,
                self.config.frame_rate,
            )?)),
            ArtifactKind::Video => {
                let codec = VideoCodec::from_fourcc(self.config.codec_id)
                    .ok_or(EncodeError::UnsupportedCodec(self.config.codec_id))?;
                Ok(Box::new(Mp4Sink::create(
                    path,
                    shape,
                    codec,
                    self.config.frame_rate,
                    self.config.jpeg_quality,
                )?))
            }
        }
    }

    /// Encode one sequence into `output_dir/<sequence>.<ext>`.
    ///
    /// # Errors
    ///
    /// Returns error if `frames` is empty, the session cannot be opened, no
    /// frame could be written or the artifact cannot be finalized. A partly
    /// written artifact is removed again.
    pub fn encode(
        &self,
        sequence: &str,
        frames: &[NormalizedFrame],
        output_dir: &Path,
    ) -> Result<EncodeReport, EncodeError> {
        let plan = FramePlan::new(frames).ok_or(EncodeError::NoFrames)?;
        let path = self.artifact_path(output_dir, sequence);
        let sink = self.open_sink(&path, plan.reference)?;
        let skipped = self.report_skipped(sequence, frames, &plan, output_dir);

        let (frame_count, write_failures) =
            match write_session(sink, sequence, frames, &plan.conforming) {
                Ok(written) => written,
                Err(err) => {
                    if let Err(remove_err) = fs::remove_file(&path) {
                        warn!("{sequence}: could not remove {}: {remove_err}", path.display());
                    }
                    return Err(err);
                }
            };

        info!(
            "{sequence}: wrote {frame_count}/{} frames to {}",
            frames.len(),
            path.display()
        );
        Ok(EncodeReport {
            artifact: MediaArtifact {
                path,
                kind: self.config.artifact_kind,
                frame_count,
            },
            skipped,
            write_failures,
        })
    }

    fn report_skipped(
        &self,
        sequence: &str,
        frames: &[NormalizedFrame],
        plan: &FramePlan,
        output_dir: &Path,
    ) -> Vec<SkippedFrame> {
        plan.skipped
            .iter()
            .map(|&(index, shape)| {
                warn!(
                    "{sequence}: skipping frame {index} with shape {shape}, expected {}",
                    plan.reference
                );
                let still_image = match self.config.skip_frame_diagnostics {
                    SkipFrameDiagnostics::LogOnly => None,
                    SkipFrameDiagnostics::EmitStillImage => {
                        Self::write_still_image(output_dir, sequence, index, &frames[index])
                    }
                };
                SkippedFrame {
                    sequence: sequence.to_string(),
                    index,
                    shape,
                    still_image,
                }
            })
            .collect()
    }

    fn write_still_image(
        output_dir: &Path,
        sequence: &str,
        index: usize,
        frame: &NormalizedFrame,
    ) -> Option<PathBuf> {
        let path = Self::still_image_path(output_dir, sequence, index);
        let image = to_gray_image(&frame.view())?;
        match image.save(&path) {
            Ok(()) => Some(path),
            Err(err) => {
                warn!("{sequence}: could not write {}: {err}", path.display());
                None
            }
        }
    }
}
