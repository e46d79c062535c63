use super::{
    validate_upload, CameraError, CameraSource, CapturePurpose, Frame, StreamConstraints,
    VideoStream,
};
use std::path::PathBuf;
use tracing::debug;

/// Camera backed by still images on disk, one per purpose.
///
/// Used by the command-line host where no video device is available; the file
/// goes through the same upload validation as an uploaded image.
#[derive(Debug, Clone, Default)]
pub struct FileCamera {
    pub face: Option<PathBuf>,
    pub id_card: Option<PathBuf>,
}

impl FileCamera {
    #[must_use]
    pub fn new(face: Option<PathBuf>, id_card: Option<PathBuf>) -> Self {
        Self { face, id_card }
    }

    fn path(&self, constraints: StreamConstraints) -> Option<&PathBuf> {
        if constraints.facing == CapturePurpose::Face.facing() {
            self.face.as_ref()
        } else {
            self.id_card.as_ref()
        }
    }
}

#[derive(Debug)]
pub struct FileStream {
    frame: Option<Frame>,
}

impl VideoStream for FileStream {
    fn current_frame(&mut self) -> Result<Frame, CameraError> {
        self.frame
            .clone()
            .ok_or_else(|| CameraError::capture("stream stopped"))
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}

impl CameraSource for FileCamera {
    type Stream = FileStream;

    async fn open(&self, constraints: StreamConstraints) -> Result<FileStream, CameraError> {
        let path = self.path(constraints).ok_or_else(|| {
            CameraError::access(format!("no image configured for {constraints:?}"))
        })?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CameraError::access(format!("{}: {e}", path.display())))?;
        validate_upload(&bytes)?;

        let rgb = image::load_from_memory(&bytes)
            .map_err(|e| CameraError::access(format!("{}: {e}", path.display())))?
            .to_rgb8();

        debug!(path = %path.display(), width = rgb.width(), height = rgb.height(), "opened image");

        Ok(FileStream {
            frame: Some(Frame {
                width: rgb.width(),
                height: rgb.height(),
                rgb: rgb.into_raw(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{capture, encode_jpeg, CaptureTrigger};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn file_camera_captures_configured_image() {
        let dir = tempfile::tempdir().unwrap();
        let face = dir.path().join("face.jpg");
        let jpeg = encode_jpeg(&Frame {
            width: 8,
            height: 8,
            rgb: vec![10; 8 * 8 * 3],
        })
        .unwrap();
        std::fs::write(&face, jpeg).unwrap();

        let camera = FileCamera::new(Some(face), None);
        let (fire, trigger) = CaptureTrigger::manual();
        fire.send(()).unwrap();

        let image = capture(&camera, CapturePurpose::Face, trigger, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(image.purpose, CapturePurpose::Face);

        let decoded = image::load_from_memory(&image.jpeg).unwrap();
        assert_eq!(decoded.width(), 8);
    }

    #[tokio::test]
    async fn missing_image_is_access_error() {
        let camera = FileCamera::new(None, Some(PathBuf::from("/nonexistent/card.png")));

        let err = camera
            .open(StreamConstraints::for_purpose(CapturePurpose::Face))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Access { .. }));

        let err = camera
            .open(StreamConstraints::for_purpose(CapturePurpose::IdCard))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Access { .. }));
    }

    #[tokio::test]
    async fn stopped_stream_has_no_frame() {
        let mut stream = FileStream {
            frame: Some(Frame {
                width: 1,
                height: 1,
                rgb: vec![0; 3],
            }),
        };
        assert!(stream.current_frame().is_ok());
        stream.stop();
        assert!(stream.current_frame().is_err());
    }
}
