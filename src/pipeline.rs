use crate::{
    config::PipelineConfig,
    deck::{DeckBuilder, DeckError, JsonDeck},
    decoder::FrameDecoder,
    encoder::{EncodeError, EncodeReport, FrameWriteFailure, MediaArtifact, MediaEncoder, SkippedFrame},
    enums::SequenceSource,
    extractor::{ExtractError, SequenceExtractor},
};

use log::{info, warn};
use rayon::prelude::*;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error("Another sequence is already named {0}")]
    DuplicateSequence(String),
}

#[derive(Debug)]
pub enum SequenceOutcome {
    Encoded(EncodeReport),
    /// No item carried pixel data.
    Empty,
    /// Decoding or encoding failed; the run went on without it.
    Failed(PipelineError),
}

#[derive(Debug)]
pub struct SequenceResult {
    pub sequence: String,
    pub outcome: SequenceOutcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// One entry per discovered sequence, in discovery order.
    pub sequences: Vec<SequenceResult>,
    pub deck: Option<PathBuf>,
}

impl RunReport {
    fn encoded(&self) -> impl Iterator<Item = &EncodeReport> {
        self.sequences.iter().filter_map(|result| match &result.outcome {
            SequenceOutcome::Encoded(report) => Some(report),
            _ => None,
        })
    }

    pub fn artifacts(&self) -> Vec<&MediaArtifact> {
        self.encoded().map(|report| &report.artifact).collect()
    }

    pub fn skipped_frames(&self) -> Vec<&SkippedFrame> {
        self.encoded().flat_map(|report| &report.skipped).collect()
    }

    pub fn write_failures(&self) -> Vec<&FrameWriteFailure> {
        self.encoded()
            .flat_map(|report| &report.write_failures)
            .collect()
    }

    pub fn empty_count(&self) -> usize {
        self.sequences
            .iter()
            .filter(|result| matches!(result.outcome, SequenceOutcome::Empty))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.sequences
            .iter()
            .filter(|result| matches!(result.outcome, SequenceOutcome::Failed(_)))
            .count()
    }
}

/// Converts every sequence below an input folder and assembles the deck.
pub struct Pipeline<D> {
    extractor: SequenceExtractor<D>,
    config: PipelineConfig,
}

impl<D: FrameDecoder> Pipeline<D> {
    pub fn new(decoder: D, config: PipelineConfig) -> Self {
        Self {
            extractor: SequenceExtractor::new(decoder),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// List the sequences of an input folder in name order.
    ///
    /// Subfolders are folder sequences, files are multi-frame sequences.
    /// Symbolic links are followed. Hidden entries are ignored.
    pub fn discover(input_dir: &Path) -> Result<Vec<SequenceSource>, PipelineError> {
        let mut sources = Vec::new();
        for entry in fs::read_dir(input_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            match fs::metadata(&path) {
                Ok(metadata) if metadata.is_dir() => sources.push(SequenceSource::Folder(path)),
                Ok(metadata) if metadata.is_file() => {
                    sources.push(SequenceSource::MultiFrameFile(path))
                }
                Ok(_) => {}
                Err(err) => warn!("Ignoring {}: {err}", path.display()),
            }
        }
        sources.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(sources)
    }

    /// Extract and encode one sequence. `Ok(None)` means there was nothing to encode.
    ///
    /// # Errors
    ///
    /// Returns error if an item fails to decode or the artifact cannot be written
    pub fn process_sequence(
        &self,
        source: &SequenceSource,
        output_dir: &Path,
    ) -> Result<Option<EncodeReport>, PipelineError> {
        let sequence = source.identifier();
        let started = Instant::now();
        info!("Reading {sequence}");

        let extracted = self.extractor.extract(source)?;
        if extracted.is_empty() {
            return Ok(None);
        }
        let report =
            MediaEncoder::new(&self.config).encode(&sequence, &extracted.frames, output_dir)?;
        info!(
            "{sequence}: done in {:.2}s",
            started.elapsed().as_secs_f64()
        );
        Ok(Some(report))
    }

    /// Run one sequence behind an error boundary.
    pub fn run_sequence(&self, source: &SequenceSource, output_dir: &Path) -> SequenceResult {
        let sequence = source.identifier();
        let outcome = match self.process_sequence(source, output_dir) {
            Ok(Some(report)) => SequenceOutcome::Encoded(report),
            Ok(None) => {
                warn!("{sequence}: no pixel data, skipping");
                SequenceOutcome::Empty
            }
            Err(PipelineError::Encode(err)) if err.is_open_error() => {
                warn!("{sequence}: skipped, encoder could not be opened: {err}");
                SequenceOutcome::Failed(PipelineError::Encode(err))
            }
            Err(err) => {
                warn!("{sequence}: skipped, {err}");
                SequenceOutcome::Failed(err)
            }
        };
        SequenceResult { sequence, outcome }
    }

    /// Like [`run_sequence`](Self::run_sequence), but a sequence whose name was
    /// already taken fails instead of overwriting the earlier artifact.
    fn run_claimed(&self, source: &SequenceSource, unique: bool, output_dir: &Path) -> SequenceResult {
        if unique {
            return self.run_sequence(source, output_dir);
        }
        let sequence = source.identifier();
        warn!("{sequence}: skipped, {} has a name already in use", source.path().display());
        SequenceResult {
            outcome: SequenceOutcome::Failed(PipelineError::DuplicateSequence(sequence.clone())),
            sequence,
        }
    }

    /// Convert all sequences of `input_dir` into `output_dir` and write the deck.
    ///
    /// # Errors
    ///
    /// Returns error only if the input cannot be listed, the output folder
    /// cannot be created or the deck cannot be saved; failures of single
    /// sequences are part of the report
    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<RunReport, PipelineError> {
        let sources = Self::discover(input_dir)?;
        fs::create_dir_all(output_dir)?;

        // names can only collide after lossy UTF-8 conversion
        let mut names = HashSet::new();
        let unique: Vec<bool> = sources
            .iter()
            .map(|source| names.insert(source.identifier()))
            .collect();

        let sequences: Vec<SequenceResult> = if self.config.parallel {
            sources
                .par_iter()
                .zip(unique.par_iter())
                .map(|(source, &unique)| self.run_claimed(source, unique, output_dir))
                .collect()
        } else {
            sources
                .iter()
                .zip(&unique)
                .map(|(source, &unique)| self.run_claimed(source, unique, output_dir))
                .collect()
        };
        let mut report = RunReport {
            sequences,
            deck: None,
        };

        let artifact_paths: Vec<&Path> = report
            .artifacts()
            .into_iter()
            .map(|artifact| artifact.path.as_path())
            .collect();
        let deck = JsonDeck::from_artifacts(&artifact_paths);
        let deck_path = output_dir.join(&self.config.deck_file_name);
        deck.save(&deck_path)?;
        info!(
            "Wrote {} slides to {}",
            deck.slides.len(),
            deck_path.display()
        );
        report.deck = Some(deck_path);
        Ok(report)
    }
}
