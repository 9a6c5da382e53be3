use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use dicom_deck::{
    config::{FourCc, PipelineConfig},
    decoder::DicomDecoder,
    enums::{ArtifactKind, SkipFrameDiagnostics},
    pipeline::Pipeline,
};
use log::error;

/// Converts folders of DICOM files into GIFs or MP4 videos and lists them in a slide deck
#[derive(Parser, Debug)]
#[command(name = "dicom-deck", version, about)]
struct Cli {
    /// Folder holding one subfolder (or multi-frame file) per sequence
    inputfolder: PathBuf,

    /// Folder receiving the media files and the deck
    outputfolder: PathBuf,

    /// JSON configuration file, flags below take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Kind of media to produce
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// Playback rate in frames per second
    #[arg(long)]
    fps: Option<f32>,

    /// Four-character video codec id
    #[arg(long)]
    codec: Option<FourCc>,

    /// Save frames left out of an artifact as PNG files
    #[arg(long)]
    emit_skipped: bool,

    /// Process sequences in parallel
    #[arg(long)]
    parallel: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Gif,
    Video,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }

    fn pipeline_config(&self) -> Result<PipelineConfig, dicom_deck::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(kind) = self.kind {
            config.artifact_kind = match kind {
                KindArg::Gif => ArtifactKind::AnimatedImage,
                KindArg::Video => ArtifactKind::Video,
            };
        }
        if let Some(fps) = self.fps {
            config.frame_rate = fps;
        }
        if let Some(codec) = self.codec {
            config.codec_id = codec;
        }
        if self.emit_skipped {
            config.skip_frame_diagnostics = SkipFrameDiagnostics::EmitStillImage;
        }
        config.parallel |= self.parallel;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    let config = match cli.pipeline_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Pipeline::new(DicomDecoder, config);
    match pipeline.run(&cli.inputfolder, &cli.outputfolder) {
        Ok(report) => {
            println!(
                "{} artifacts, {} empty, {} failed, {} skipped frames",
                report.artifacts().len(),
                report.empty_count(),
                report.failed_count(),
                report.skipped_frames().len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
