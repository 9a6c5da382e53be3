use dicom_deck::{
    config::PipelineConfig,
    deck::{JsonDeck, SlideKind},
    decoder::{DecodeError, Decoded, FrameDecoder},
    encoder::EncodeError,
    enums::{ArtifactKind, SequenceSource, SkipFrameDiagnostics},
    frame::{RawFrame, Shape},
    pipeline::{Pipeline, PipelineError, SequenceOutcome},
};
use image::{AnimationDecoder, codecs::gif::GifDecoder};
use ndarray::Array2;
use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};

/// Reads tiny text "scans": `none` for an item without pixel data, otherwise
/// `HxW:v1,v2,...` with one filled frame per value.
struct TextDecoder;

impl FrameDecoder for TextDecoder {
    fn decode(&self, path: &Path) -> Result<Decoded, DecodeError> {
        let text = fs::read_to_string(path)?;
        let text = text.trim();
        if text == "none" {
            return Ok(Decoded::NoPixelData);
        }
        let invalid = || {
            DecodeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad scan {text:?}"),
            ))
        };
        let (shape, values) = text.split_once(':').ok_or_else(invalid)?;
        let (height, width) = shape.split_once('x').ok_or_else(invalid)?;
        let height: usize = height.parse().map_err(|_| invalid())?;
        let width: usize = width.parse().map_err(|_| invalid())?;
        let frames = values
            .split(',')
            .map(|v| {
                v.parse::<u16>()
                    .map(|v| RawFrame::from_elem((height, width), v))
                    .map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Decoded::Frames(frames))
    }
}

fn write_scan(dir: &Path, name: &str, contents: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), contents).unwrap();
}

fn gif_config() -> PipelineConfig {
    PipelineConfig {
        artifact_kind: ArtifactKind::AnimatedImage,
        ..Default::default()
    }
}

fn gif_frame_values(path: &Path) -> Vec<u8> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path).unwrap())).unwrap();
    decoder
        .into_frames()
        .map(|frame| frame.unwrap().buffer().get_pixel(0, 0).0[0])
        .collect()
}

#[test]
fn twelve_bit_sequence_becomes_one_artifact() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let series = input.path().join("series1");
    write_scan(&series, "001.dcm", "100x100:50");
    write_scan(&series, "002.dcm", "100x100:4000");
    write_scan(&series, "003.dcm", "100x100:4000");

    let report = Pipeline::new(TextDecoder, gif_config())
        .run(input.path(), output.path())
        .unwrap();

    let artifacts = report.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].frame_count, 3);
    assert!(report.skipped_frames().is_empty());
    assert_eq!(
        gif_frame_values(&artifacts[0].path),
        vec![50 >> 4, (4000 >> 4) as u8, (4000 >> 4) as u8]
    );
}

#[test]
fn differently_sized_frame_is_skipped() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let series = input.path().join("mixed");
    write_scan(&series, "a.dcm", "100x100:10");
    write_scan(&series, "b.dcm", "50x50:20");

    let config = PipelineConfig {
        skip_frame_diagnostics: SkipFrameDiagnostics::EmitStillImage,
        ..gif_config()
    };
    let report = Pipeline::new(TextDecoder, config)
        .run(input.path(), output.path())
        .unwrap();

    let artifacts = report.artifacts();
    assert_eq!(artifacts[0].frame_count, 1);
    assert_eq!(gif_frame_values(&artifacts[0].path), vec![10]);

    let skipped = report.skipped_frames();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].sequence, "mixed");
    assert_eq!(skipped[0].index, 1);
    assert_eq!(skipped[0].shape, Shape::new(50, 50));
    assert!(output.path().join("mixed.skipped.1.png").exists());
}

#[test]
fn bad_sequences_do_not_stop_the_run() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scan(&input.path().join("a_broken"), "x.dcm", "garbage");
    write_scan(&input.path().join("b_empty"), "DICOMDIR", "none");
    write_scan(&input.path().join("c_good"), "1.dcm", "8x8:300");
    write_scan(&input.path().join("c_good"), "2.dcm", "8x8:200");

    let report = Pipeline::new(TextDecoder, PipelineConfig::default())
        .run(input.path(), output.path())
        .unwrap();

    let names: Vec<&str> = report
        .sequences
        .iter()
        .map(|result| result.sequence.as_str())
        .collect();
    assert_eq!(names, vec!["a_broken", "b_empty", "c_good"]);
    assert!(matches!(
        report.sequences[0].outcome,
        SequenceOutcome::Failed(PipelineError::Extract(_))
    ));
    assert!(matches!(report.sequences[1].outcome, SequenceOutcome::Empty));
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.empty_count(), 1);

    let artifacts = report.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].path, output.path().join("c_good.mp4"));
    assert!(!output.path().join("b_empty.mp4").exists());

    let deck_path = report.deck.unwrap();
    let deck: JsonDeck = serde_json::from_str(&fs::read_to_string(deck_path).unwrap()).unwrap();
    assert_eq!(deck.slides.len(), 1);
    assert_eq!(deck.slides[0].kind, SlideKind::Movie);
    assert_eq!(deck.slides[0].media, output.path().join("c_good.mp4"));
}

#[test]
fn unavailable_codec_fails_each_sequence_but_writes_deck() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scan(&input.path().join("s1"), "1.dcm", "4x4:1");
    write_scan(&input.path().join("s2"), "1.dcm", "4x4:2");

    let config = PipelineConfig {
        codec_id: "avc1".parse().unwrap(),
        ..Default::default()
    };
    let report = Pipeline::new(TextDecoder, config)
        .run(input.path(), output.path())
        .unwrap();

    assert_eq!(report.failed_count(), 2);
    for result in &report.sequences {
        match &result.outcome {
            SequenceOutcome::Failed(PipelineError::Encode(err)) => {
                assert!(matches!(err, EncodeError::UnsupportedCodec(_)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert!(report.deck.unwrap().exists());
}

#[test]
fn top_level_files_are_multi_frame_sequences() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scan(input.path(), "cine.dcm", "6x6:10,20,30,40");
    write_scan(input.path(), ".hidden", "garbage");

    let sources = Pipeline::<TextDecoder>::discover(input.path()).unwrap();
    assert_eq!(
        sources,
        vec![SequenceSource::MultiFrameFile(input.path().join("cine.dcm"))]
    );

    let report = Pipeline::new(TextDecoder, gif_config())
        .run(input.path(), output.path())
        .unwrap();
    let artifacts = report.artifacts();
    assert_eq!(artifacts[0].path, output.path().join("cine.dcm.gif"));
    assert_eq!(gif_frame_values(&artifacts[0].path), vec![10, 20, 30, 40]);
}

#[test]
fn parallel_run_keeps_sequence_and_frame_order() {
    let input = tempfile::tempdir().unwrap();
    let sequential_out = tempfile::tempdir().unwrap();
    let parallel_out = tempfile::tempdir().unwrap();
    for s in 0..6 {
        let dir = input.path().join(format!("seq{s}"));
        for f in 0..4 {
            write_scan(&dir, &format!("{f:03}.dcm"), &format!("5x7:{}", s * 10 + f));
        }
    }

    let sequential = Pipeline::new(TextDecoder, gif_config())
        .run(input.path(), sequential_out.path())
        .unwrap();
    let parallel = Pipeline::new(
        TextDecoder,
        PipelineConfig {
            parallel: true,
            ..gif_config()
        },
    )
    .run(input.path(), parallel_out.path())
    .unwrap();

    let names = |report: &dicom_deck::pipeline::RunReport| -> Vec<String> {
        report.sequences.iter().map(|r| r.sequence.clone()).collect()
    };
    assert_eq!(names(&sequential), names(&parallel));
    for (a, b) in sequential.artifacts().iter().zip(parallel.artifacts()) {
        assert_eq!(gif_frame_values(&a.path), gif_frame_values(&b.path));
    }
    assert_eq!(
        gif_frame_values(&parallel_out.path().join("seq2.gif")),
        vec![20, 21, 22, 23]
    );
}

#[test]
fn extraction_is_byte_identical_across_runs() {
    let input = tempfile::tempdir().unwrap();
    let series = input.path().join("s");
    write_scan(&series, "1.dcm", "3x3:60000");
    write_scan(&series, "2.dcm", "3x3:5000");

    let extractor = dicom_deck::extractor::SequenceExtractor::new(TextDecoder);
    let source = SequenceSource::Folder(series);
    let first = extractor.extract(&source).unwrap();
    let second = extractor.extract(&source).unwrap();
    assert_eq!(first.frames, second.frames);
    assert_eq!(
        first.frames[0],
        Array2::from_elem((3, 3), ((60000u16 >> 8) + 128).min(255) as u8)
    );
}

#[test]
fn folder_and_file_with_the_same_stem_do_not_share_an_artifact() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scan(&input.path().join("scan"), "1.dcm", "4x4:10,20");
    write_scan(input.path(), "scan.dcm", "4x4:200,210,220");

    let report = Pipeline::new(
        TextDecoder,
        PipelineConfig {
            parallel: true,
            ..gif_config()
        },
    )
    .run(input.path(), output.path())
    .unwrap();

    let artifacts = report.artifacts();
    assert_eq!(artifacts.len(), 2);
    assert_ne!(artifacts[0].path, artifacts[1].path);
    for artifact in artifacts {
        assert_eq!(gif_frame_values(&artifact.path).len(), artifact.frame_count);
    }
    assert_eq!(gif_frame_values(&output.path().join("scan.gif")), vec![10, 20]);
    assert_eq!(
        gif_frame_values(&output.path().join("scan.dcm.gif")),
        vec![200, 210, 220]
    );
}

#[cfg(unix)]
#[test]
fn symlinked_sequences_and_items_are_followed() {
    use std::os::unix::fs::symlink;

    let store = tempfile::tempdir().unwrap();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scan(store.path(), "slice.dcm", "4x4:30");
    write_scan(&store.path().join("elsewhere"), "1.dcm", "4x4:40");
    write_scan(&input.path().join("series"), "1.dcm", "4x4:10");
    symlink(store.path().join("slice.dcm"), input.path().join("series/2.dcm")).unwrap();
    symlink(store.path().join("elsewhere"), input.path().join("linked")).unwrap();

    let report = Pipeline::new(TextDecoder, gif_config())
        .run(input.path(), output.path())
        .unwrap();

    let names: Vec<&str> = report.sequences.iter().map(|r| r.sequence.as_str()).collect();
    assert_eq!(names, vec!["linked", "series"]);
    assert_eq!(gif_frame_values(&output.path().join("series.gif")), vec![10, 30]);
    assert_eq!(gif_frame_values(&output.path().join("linked.gif")), vec![40]);
}

#[cfg(target_os = "linux")]
#[test]
fn names_that_collide_after_lossy_conversion_fail_the_later_sequence() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scan(&input.path().join(OsStr::from_bytes(b"scan\xfe")), "1.dcm", "4x4:10");
    write_scan(&input.path().join(OsStr::from_bytes(b"scan\xff")), "1.dcm", "4x4:20");

    let report = Pipeline::new(TextDecoder, gif_config())
        .run(input.path(), output.path())
        .unwrap();

    assert_eq!(report.artifacts().len(), 1);
    assert!(matches!(
        report.sequences[1].outcome,
        SequenceOutcome::Failed(PipelineError::DuplicateSequence(_))
    ));
    assert_eq!(gif_frame_values(&report.artifacts()[0].path), vec![10]);
}

#[test]
fn hidden_files_inside_a_series_are_ignored() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let series = input.path().join("series");
    write_scan(&series, "1.dcm", "4x4:10");
    write_scan(&series, ".DS_Store", "garbage");

    let report = Pipeline::new(TextDecoder, gif_config())
        .run(input.path(), output.path())
        .unwrap();
    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.artifacts()[0].frame_count, 1);
}
