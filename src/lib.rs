//! # DICOM-deck library
//!
//! This crate turns folders of single-image DICOM files into viewable media
//! and lists the results in a slide deck, one slide per sequence.

//!
//! Each subfolder of the input folder is one sequence (a file directly in the
//! input folder is read as a multi-frame sequence). A sequence goes through
//! two stages:
//!  - Extraction: every file is decoded with dicom-rs, files without pixel
//!    data are ignored and all frames are rescaled to 8 bits with a single
//!    sequence-wide rule picked from the largest sample value:
//!     - below 256: unchanged
//!     - below 4096: shifted right by 4 bits
//!     - otherwise: shifted right by 8 bits plus an offset of 128, clamped
//!  - Encoding: the frames are written, in order, to an animated GIF or an
//!    MP4 video (Motion JPEG). Frames whose size differs from the first frame
//!    are left out and reported, optionally as separate PNG files.
//!
//!  A failing sequence is logged and skipped; it never aborts the run.
//!  Sequences can be processed in parallel using rayon.
//!
//! # Examples
//!
//! ## Converting a study folder
//!
//! ```no_run
//! # use dicom_deck::{config::PipelineConfig, decoder::DicomDecoder, enums::ArtifactKind, pipeline::Pipeline};
//! # use std::path::Path;
//! let config = PipelineConfig {
//!     artifact_kind: ArtifactKind::AnimatedImage,
//!     frame_rate: 15.0,
//!     ..Default::default()
//! };
//! let report = Pipeline::new(DicomDecoder, config)
//!     .run(Path::new("study"), Path::new("out"))
//!     .expect("should have listed the study folder");
//! for artifact in report.artifacts() {
//!     println!("{}: {} frames", artifact.path.display(), artifact.frame_count);
//! }
//! ```

pub mod config;
pub mod deck;
pub mod decoder;
pub mod encoder;
pub mod enums;
pub mod extractor;
pub mod frame;
pub mod gif_sink;
pub mod mp4_sink;
pub mod pipeline;
