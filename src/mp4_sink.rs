//! Video session writing an ISO base media (MP4) file.
//!
//! Samples are appended to the `mdat` box as they arrive; the `moov` index is
//! written by [`FrameSink::finish`], after which the `mdat` size is patched.

use crate::{
    config::FourCc,
    encoder::{EncodeError, FrameSink},
    frame::Shape,
};

use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};
use ndarray::ArrayView2;
use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::Path,
};

/// Media timescale in ticks per second.
pub const TIMESCALE: u32 = 90_000;

const IDENTITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Sample formats the session can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Motion JPEG, one grayscale JPEG per sample.
    Mjpeg,
    /// Uncompressed 24-bit RGB.
    Raw,
}

impl VideoCodec {
    /// Map a configured codec id, `None` when no encoder is available for it.
    pub fn from_fourcc(code: FourCc) -> Option<Self> {
        match code.as_bytes() {
            b"mjpg" | b"MJPG" | b"jpeg" | b"mjpa" => Some(VideoCodec::Mjpeg),
            b"raw " => Some(VideoCodec::Raw),
            _ => None,
        }
    }

    /// Sample entry type written to `stsd`.
    pub fn sample_entry(&self) -> &'static [u8; 4] {
        match self {
            VideoCodec::Mjpeg => b"jpeg",
            VideoCodec::Raw => b"raw ",
        }
    }
}

pub struct Mp4Sink<W: Write + Seek> {
    writer: W,
    codec: VideoCodec,
    shape: Shape,
    sample_delta: u32,
    jpeg_quality: u8,
    mdat_start: u64,
    sample_sizes: Vec<u32>,
    mdat_len: u64,
    /// Set when a sample was only partly written; `mdat` no longer matches the index.
    broken: bool,
}

impl Mp4Sink<BufWriter<File>> {
    pub fn create(
        path: &Path,
        shape: Shape,
        codec: VideoCodec,
        frame_rate: f32,
        jpeg_quality: u8,
    ) -> Result<Self, EncodeError> {
        Self::check_shape(shape)?;
        let file = File::create(path).map_err(|source| EncodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufWriter::new(file), shape, codec, frame_rate, jpeg_quality)
    }
}

impl<W: Write + Seek> Mp4Sink<W> {
    /// Start a session on any seekable writer.
    pub fn new(
        mut writer: W,
        shape: Shape,
        codec: VideoCodec,
        frame_rate: f32,
        jpeg_quality: u8,
    ) -> Result<Self, EncodeError> {
        Self::check_shape(shape)?;
        let mut header = Vec::new();
        write_ftyp(&mut header);
        writer.write_all(&header)?;
        let mdat_start = writer.stream_position()?;
        // size is patched in `finish`
        writer.write_all(&0u32.to_be_bytes())?;
        writer.write_all(b"mdat")?;
        Ok(Self {
            writer,
            codec,
            shape,
            sample_delta: sample_delta(frame_rate),
            jpeg_quality,
            mdat_start,
            sample_sizes: Vec::new(),
            mdat_len: 8,
            broken: false,
        })
    }

    fn check_shape(shape: Shape) -> Result<(), EncodeError> {
        let max = usize::from(u16::MAX);
        if shape.width == 0 || shape.height == 0 || shape.width > max || shape.height > max {
            return Err(EncodeError::UnsupportedSize(shape));
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.sample_sizes.len()
    }

    fn encode_sample(&self, frame: &ArrayView2<'_, u8>) -> Result<Vec<u8>, EncodeError> {
        let pixels: Vec<u8> = frame.iter().copied().collect();
        let (width, height) = self.shape.codec_dimensions();
        match self.codec {
            VideoCodec::Mjpeg => {
                let mut buffer = Vec::new();
                JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality).encode(
                    &pixels,
                    width as u32,
                    height as u32,
                    ExtendedColorType::L8,
                )?;
                Ok(buffer)
            }
            VideoCodec::Raw => Ok(pixels.iter().flat_map(|&v| [v, v, v]).collect()),
        }
    }

    /// Close the session and hand back the writer.
    pub fn finalize(mut self) -> Result<W, EncodeError> {
        if self.broken {
            return Err(EncodeError::SessionClosed);
        }
        let mdat_size = u32::try_from(self.mdat_len).map_err(|_| EncodeError::ContainerFull)?;
        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.mdat_start))?;
        self.writer.write_all(&mdat_size.to_be_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;

        let mut moov = Vec::new();
        self.write_moov(&mut moov)?;
        self.writer.write_all(&moov)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn duration(&self) -> u32 {
        (self.sample_sizes.len() as u32).saturating_mul(self.sample_delta)
    }

    fn write_moov(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        let mut body = Vec::new();
        self.write_mvhd(&mut body);
        self.write_trak(&mut body)?;
        write_box(out, b"moov", &body);
        Ok(())
    }

    fn write_mvhd(&self, out: &mut Vec<u8>) {
        let mut body = full_box_header(0, 0);
        push_u32(&mut body, 0); // creation time
        push_u32(&mut body, 0); // modification time
        push_u32(&mut body, TIMESCALE);
        push_u32(&mut body, self.duration());
        push_u32(&mut body, 0x0001_0000); // rate 1.0
        body.extend_from_slice(&[0x01, 0x00]); // volume 1.0
        body.extend_from_slice(&[0u8; 10]);
        push_matrix(&mut body);
        body.extend_from_slice(&[0u8; 24]);
        push_u32(&mut body, 2); // next track id
        write_box(out, b"mvhd", &body);
    }

    fn write_trak(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        let (width, height) = self.shape.codec_dimensions();
        let mut tkhd = full_box_header(0, 3); // enabled, in movie
        push_u32(&mut tkhd, 0);
        push_u32(&mut tkhd, 0);
        push_u32(&mut tkhd, 1); // track id
        push_u32(&mut tkhd, 0);
        push_u32(&mut tkhd, self.duration());
        tkhd.extend_from_slice(&[0u8; 8]);
        tkhd.extend_from_slice(&[0u8; 8]); // layer, group, volume, reserved
        push_matrix(&mut tkhd);
        push_u32(&mut tkhd, (width as u32) << 16);
        push_u32(&mut tkhd, (height as u32) << 16);

        let mut mdhd = full_box_header(0, 0);
        push_u32(&mut mdhd, 0);
        push_u32(&mut mdhd, 0);
        push_u32(&mut mdhd, TIMESCALE);
        push_u32(&mut mdhd, self.duration());
        mdhd.extend_from_slice(&0x55c4u16.to_be_bytes()); // und
        mdhd.extend_from_slice(&[0, 0]);

        let mut hdlr = full_box_header(0, 0);
        push_u32(&mut hdlr, 0);
        hdlr.extend_from_slice(b"vide");
        hdlr.extend_from_slice(&[0u8; 12]);
        hdlr.extend_from_slice(b"VideoHandler\0");

        let mut vmhd = full_box_header(0, 1);
        vmhd.extend_from_slice(&[0u8; 8]);

        let mut url = Vec::new();
        write_box(&mut url, b"url ", &full_box_header(0, 1));
        let mut dref = full_box_header(0, 0);
        push_u32(&mut dref, 1);
        dref.extend_from_slice(&url);
        let mut dinf = Vec::new();
        write_box(&mut dinf, b"dref", &dref);

        let mut minf = Vec::new();
        write_box(&mut minf, b"vmhd", &vmhd);
        write_box(&mut minf, b"dinf", &dinf);
        write_box(&mut minf, b"stbl", &self.sample_table()?);

        let mut mdia = Vec::new();
        write_box(&mut mdia, b"mdhd", &mdhd);
        write_box(&mut mdia, b"hdlr", &hdlr);
        write_box(&mut mdia, b"minf", &minf);

        let mut trak = Vec::new();
        write_box(&mut trak, b"tkhd", &tkhd);
        write_box(&mut trak, b"mdia", &mdia);
        write_box(out, b"trak", &trak);
        Ok(())
    }

    fn sample_table(&self) -> Result<Vec<u8>, EncodeError> {
        let (width, height) = self.shape.codec_dimensions();
        let count = self.sample_sizes.len() as u32;

        let mut entry = vec![0u8; 6];
        entry.extend_from_slice(&1u16.to_be_bytes()); // data reference index
        entry.extend_from_slice(&[0u8; 16]);
        entry.extend_from_slice(&(width as u16).to_be_bytes());
        entry.extend_from_slice(&(height as u16).to_be_bytes());
        push_u32(&mut entry, 0x0048_0000); // 72 dpi
        push_u32(&mut entry, 0x0048_0000);
        push_u32(&mut entry, 0);
        entry.extend_from_slice(&1u16.to_be_bytes()); // frames per sample
        let mut compressor = [0u8; 32];
        let name = b"dicom-deck";
        compressor[0] = name.len() as u8;
        compressor[1..=name.len()].copy_from_slice(name);
        entry.extend_from_slice(&compressor);
        entry.extend_from_slice(&24u16.to_be_bytes());
        entry.extend_from_slice(&(-1i16).to_be_bytes());
        let mut stsd = full_box_header(0, 0);
        push_u32(&mut stsd, 1);
        write_box(&mut stsd, self.codec.sample_entry(), &entry);

        let mut stts = full_box_header(0, 0);
        if count == 0 {
            push_u32(&mut stts, 0);
        } else {
            push_u32(&mut stts, 1);
            push_u32(&mut stts, count);
            push_u32(&mut stts, self.sample_delta);
        }

        // every sample lives in one chunk
        let mut stsc = full_box_header(0, 0);
        push_u32(&mut stsc, 1);
        push_u32(&mut stsc, 1);
        push_u32(&mut stsc, count);
        push_u32(&mut stsc, 1);

        let mut stsz = full_box_header(0, 0);
        push_u32(&mut stsz, 0);
        push_u32(&mut stsz, count);
        for size in &self.sample_sizes {
            push_u32(&mut stsz, *size);
        }

        let chunk_offset =
            u32::try_from(self.mdat_start + 8).map_err(|_| EncodeError::ContainerFull)?;
        let mut stco = full_box_header(0, 0);
        push_u32(&mut stco, 1);
        push_u32(&mut stco, chunk_offset);

        let mut stbl = Vec::new();
        write_box(&mut stbl, b"stsd", &stsd);
        write_box(&mut stbl, b"stts", &stts);
        write_box(&mut stbl, b"stsc", &stsc);
        write_box(&mut stbl, b"stsz", &stsz);
        write_box(&mut stbl, b"stco", &stco);
        Ok(stbl)
    }
}

impl<W: Write + Seek> FrameSink for Mp4Sink<W> {
    fn write_frame(&mut self, frame: ArrayView2<'_, u8>) -> Result<(), EncodeError> {
        if self.broken {
            return Err(EncodeError::SessionClosed);
        }
        let actual = Shape::of(&frame);
        if actual != self.shape {
            return Err(EncodeError::ShapeMismatch {
                expected: self.shape,
                actual,
            });
        }
        let sample = self.encode_sample(&frame)?;
        let size = u32::try_from(sample.len()).map_err(|_| EncodeError::ContainerFull)?;
        if self.mdat_len + u64::from(size) > u64::from(u32::MAX) {
            return Err(EncodeError::ContainerFull);
        }
        if let Err(err) = self.writer.write_all(&sample) {
            self.broken = true;
            return Err(err.into());
        }
        self.sample_sizes.push(size);
        self.mdat_len += u64::from(size);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), EncodeError> {
        self.finalize().map(|_| ())
    }
}

/// Ticks per frame, at least one.
pub fn sample_delta(frame_rate: f32) -> u32 {
    (TIMESCALE as f32 / frame_rate)
        .round()
        .clamp(1.0, u32::MAX as f32) as u32
}

fn write_ftyp(out: &mut Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(b"isom");
    push_u32(&mut body, 512);
    for brand in [b"isom", b"iso2", b"mp41"] {
        body.extend_from_slice(brand);
    }
    write_box(out, b"ftyp", &body);
}

fn write_box(out: &mut Vec<u8>, kind: &[u8; 4], body: &[u8]) {
    push_u32(out, (8 + body.len()) as u32);
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
}

fn full_box_header(version: u8, flags: u32) -> Vec<u8> {
    let mut header = flags.to_be_bytes();
    header[0] = version;
    header.to_vec()
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_matrix(out: &mut Vec<u8>) {
    for value in IDENTITY_MATRIX {
        push_u32(out, value);
    }
}
