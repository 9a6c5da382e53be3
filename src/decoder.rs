use crate::frame::RawFrame;

use dicom::{
    object::{DefaultDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Axis, s};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    Pixel(#[from] dicom::pixeldata::Error),
}

/// Result of decoding one source item.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Every frame the item carries, in frame-index order.
    Frames(Vec<RawFrame>),
    /// The item is readable but holds no image, e.g. a DICOMDIR or a report.
    NoPixelData,
}

/// Turns one file into raw frames.
pub trait FrameDecoder: Sync {
    /// # Errors
    ///
    /// Returns error if the file cannot be read or its pixel data cannot be decoded
    fn decode(&self, path: &Path) -> Result<Decoded, DecodeError>;
}

/// Decoder backed by dicom-rs.
///
/// Samples are returned as stored: no modality rescale and no VOI windowing
/// is applied. Images with several samples per pixel contribute their first
/// sample plane.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomDecoder;

impl DicomDecoder {
    fn decode_object(dicom_object: &DefaultDicomObject) -> Result<Decoded, DecodeError> {
        if dicom_object.get(tags::PIXEL_DATA).is_none() {
            return Ok(Decoded::NoPixelData);
        }
        let pixel_data = dicom_object.decode_pixel_data()?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        // (frames, rows, columns, samples)
        let volume = pixel_data.to_ndarray_with_options::<u16>(&options)?;
        let frames = volume
            .axis_iter(Axis(0))
            .map(|frame| frame.slice(s![.., .., 0]).to_owned())
            .collect();
        Ok(Decoded::Frames(frames))
    }
}

impl FrameDecoder for DicomDecoder {
    fn decode(&self, path: &Path) -> Result<Decoded, DecodeError> {
        let dicom_object = open_file(path)?;
        Self::decode_object(&dicom_object)
    }
}
