//! Still capture from a video source.
//!
//! A [`CameraSource`] opens a [`VideoStream`] for a purpose; [`capture`] waits
//! for the trigger, rasterizes exactly one frame to JPEG and releases the
//! stream on every exit path.

pub mod encode;
pub mod file;

pub use encode::{encode_jpeg, validate_upload, JPEG_QUALITY, MAX_UPLOAD_BYTES};
pub use file::FileCamera;

use base64ct::{Base64, Encoding};
use std::{fmt, future::Future, time::Duration};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub const CAMERA_ACCESS_MESSAGE: &str =
    "カメラへのアクセスに失敗しました。カメラの権限を確認してください。";
pub const CAPTURE_FAILED_MESSAGE: &str = "画像のキャプチャに失敗しました。";

/// Delay before the countdown starts so the subject can settle.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
pub const COUNTDOWN_FROM: u8 = 3;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("カメラへのアクセスに失敗しました。カメラの権限を確認してください。")]
    Access { reason: String },

    #[error("画像のキャプチャに失敗しました。")]
    Capture { reason: String },

    #[error("capture cancelled")]
    Cancelled,

    #[error("{0}")]
    InvalidUpload(String),
}

impl CameraError {
    pub fn access(reason: impl fmt::Display) -> Self {
        Self::Access {
            reason: reason.to_string(),
        }
    }

    pub fn capture(reason: impl fmt::Display) -> Self {
        Self::Capture {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapturePurpose {
    Face,
    IdCard,
}

impl CapturePurpose {
    #[must_use]
    pub const fn facing(self) -> Facing {
        match self {
            Self::Face => Facing::User,
            Self::IdCard => Facing::Environment,
        }
    }
}

impl fmt::Display for CapturePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Face => write!(f, "face"),
            Self::IdCard => write!(f, "idcard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    User,
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

pub const PREFERRED_RESOLUTION: Resolution = Resolution {
    width: 1280,
    height: 720,
};

/// What the stream is asked for. Sources treat the resolution as a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: Facing,
    pub resolution: Resolution,
}

impl StreamConstraints {
    #[must_use]
    pub const fn for_purpose(purpose: CapturePurpose) -> Self {
        Self {
            facing: purpose.facing(),
            resolution: PREFERRED_RESOLUTION,
        }
    }
}

/// One decoded RGB8 frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgb.len())
            .finish()
    }
}

/// Encoded still frame, consumed once by a flow.
#[derive(Clone, PartialEq, Eq)]
pub struct CaptureImage {
    pub purpose: CapturePurpose,
    pub jpeg: Vec<u8>,
}

impl CaptureImage {
    /// Standard base64 without a data-URI prefix, as the backend expects.
    #[must_use]
    pub fn to_base64(&self) -> String {
        Base64::encode_string(&self.jpeg)
    }
}

impl fmt::Debug for CaptureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureImage")
            .field("purpose", &self.purpose)
            .field("bytes", &self.jpeg.len())
            .finish()
    }
}

pub trait VideoStream: Send {
    /// # Errors
    /// Returns an error if no frame can be read
    fn current_frame(&mut self) -> Result<Frame, CameraError>;

    /// Release the underlying device. Called exactly once.
    fn stop(&mut self);
}

pub trait CameraSource: Send + Sync {
    type Stream: VideoStream;

    fn open(
        &self,
        constraints: StreamConstraints,
    ) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;
}

/// Stops the stream when dropped.
struct StreamGuard<T: VideoStream> {
    stream: T,
}

impl<T: VideoStream> Drop for StreamGuard<T> {
    fn drop(&mut self) {
        self.stream.stop();
    }
}

/// How the capture is fired.
#[derive(Debug)]
pub enum CaptureTrigger {
    /// Capture when the sender fires. A dropped sender counts as cancellation.
    Manual(oneshot::Receiver<()>),
    /// Settle, count down from three, then capture. Ticks are sent when a
    /// listener is attached.
    Countdown(Option<mpsc::UnboundedSender<u8>>),
}

impl CaptureTrigger {
    /// Trigger paired with the handle that fires it.
    #[must_use]
    pub fn manual() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self::Manual(rx))
    }

    #[must_use]
    pub const fn countdown() -> Self {
        Self::Countdown(None)
    }

    /// Countdown whose ticks (3, 2, 1) are observable on the returned receiver.
    #[must_use]
    pub fn countdown_observed() -> (mpsc::UnboundedReceiver<u8>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (rx, Self::Countdown(Some(tx)))
    }

    async fn fired(self) -> Result<(), CameraError> {
        match self {
            Self::Manual(rx) => rx.await.map_err(|_| CameraError::Cancelled),
            Self::Countdown(ticks) => {
                tokio::time::sleep(SETTLE_DELAY).await;
                for n in (1..=COUNTDOWN_FROM).rev() {
                    if let Some(ticks) = &ticks {
                        // A listener that went away does not stop the countdown.
                        let _ = ticks.send(n);
                    }
                    tokio::time::sleep(COUNTDOWN_TICK).await;
                }
                Ok(())
            }
        }
    }
}

/// Open a stream for `purpose`, wait for the trigger and encode one frame.
///
/// # Errors
/// [`CameraError::Access`] when the device cannot be opened,
/// [`CameraError::Capture`] when the frame cannot be read or encoded and
/// [`CameraError::Cancelled`] when the token fires or a manual trigger is dropped.
#[instrument(skip(source, trigger, cancel))]
pub async fn capture<S: CameraSource>(
    source: &S,
    purpose: CapturePurpose,
    trigger: CaptureTrigger,
    cancel: &CancellationToken,
) -> Result<CaptureImage, CameraError> {
    let constraints = StreamConstraints::for_purpose(purpose);

    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(CameraError::Cancelled),
        stream = source.open(constraints) => stream?,
    };
    let mut guard = StreamGuard { stream };

    debug!(?constraints, "stream ready");

    tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(CameraError::Cancelled),
        fired = trigger.fired() => fired?,
    }

    let frame = guard.stream.current_frame()?;
    let jpeg = encode_jpeg(&frame)?;

    debug!(bytes = jpeg.len(), "frame captured");

    Ok(CaptureImage { purpose, jpeg })
}
