use super::{CameraError, Frame};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageFormat};

/// JPEG quality used for every capture (0.85).
pub const JPEG_QUALITY: u8 = 85;

/// Largest image accepted from a file upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Rasterize an RGB8 frame to JPEG.
///
/// # Errors
/// Returns [`CameraError::Capture`] if the frame is empty, its buffer does not
/// match its dimensions or the encoder fails
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, CameraError> {
    let expected = (frame.width as usize)
        .checked_mul(frame.height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| CameraError::capture("frame dimensions overflow"))?;

    if expected == 0 || frame.rgb.len() != expected {
        return Err(CameraError::capture(format!(
            "frame buffer is {} bytes, expected {expected}",
            frame.rgb.len()
        )));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(&frame.rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(CameraError::capture)?;

    Ok(jpeg)
}

/// Accept JPEG or PNG uploads up to [`MAX_UPLOAD_BYTES`].
///
/// # Errors
/// Returns [`CameraError::InvalidUpload`] naming the rejected property
pub fn validate_upload(bytes: &[u8]) -> Result<ImageFormat, CameraError> {
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(CameraError::InvalidUpload(format!(
            "image is {} bytes, the limit is {MAX_UPLOAD_BYTES}",
            bytes.len()
        )));
    }

    match image::guess_format(bytes) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Ok(format),
        Ok(format) => Err(CameraError::InvalidUpload(format!(
            "unsupported image format: {format:?}"
        ))),
        Err(_) => Err(CameraError::InvalidUpload(
            "unrecognized image data".to_string(),
        )),
    }
}
