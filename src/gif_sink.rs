use crate::{
    encoder::{EncodeError, FrameSink},
    frame::{Shape, to_gray_image},
};

use image::{
    Delay, DynamicImage, Frame,
    codecs::gif::{GifEncoder, Repeat},
};
use ndarray::ArrayView2;
use std::{
    fs::File,
    io::{self, BufWriter, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

/// Last byte of every complete GIF stream.
const TRAILER: u8 = 0x3B;

/// Looping animated GIF session.
pub struct GifSink {
    encoder: GifEncoder<BufWriter<File>>,
    path: PathBuf,
    shape: Shape,
    delay: Delay,
}

impl GifSink {
    pub fn create(path: &Path, shape: Shape, frame_rate: f32) -> Result<Self, EncodeError> {
        let max = usize::from(u16::MAX);
        if shape.width == 0 || shape.height == 0 || shape.width > max || shape.height > max {
            return Err(EncodeError::UnsupportedSize(shape));
        }
        let file = File::create(path).map_err(|source| EncodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut encoder = GifEncoder::new(BufWriter::new(file));
        encoder.set_repeat(Repeat::Infinite)?;
        Ok(Self {
            encoder,
            path: path.to_path_buf(),
            shape,
            delay: Self::frame_delay(frame_rate),
        })
    }

    /// Display time of one frame, at least 10ms (the GIF tick).
    pub fn frame_delay(frame_rate: f32) -> Delay {
        let millis = (1000.0 / frame_rate).round().clamp(10.0, u32::MAX as f32) as u32;
        Delay::from_numer_denom_ms(millis, 1)
    }

    fn ends_with_trailer(path: &Path) -> io::Result<bool> {
        let mut file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8];
        file.read_exact(&mut last)?;
        Ok(last[0] == TRAILER)
    }
}

impl FrameSink for GifSink {
    fn write_frame(&mut self, frame: ArrayView2<'_, u8>) -> Result<(), EncodeError> {
        let actual = Shape::of(&frame);
        if actual != self.shape {
            return Err(EncodeError::ShapeMismatch {
                expected: self.shape,
                actual,
            });
        }
        let gray = to_gray_image(&frame).ok_or(EncodeError::UnsupportedSize(actual))?;
        let rgba = DynamicImage::ImageLuma8(gray).to_rgba8();
        self.encoder
            .encode_frame(Frame::from_parts(rgba, 0, 0, self.delay))?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), EncodeError> {
        let path = self.path.clone();
        // the encoder writes the trailer and flushes on drop, ignoring errors
        drop(self);
        if Self::ends_with_trailer(&path)? {
            Ok(())
        } else {
            Err(EncodeError::Incomplete(path))
        }
    }
}
