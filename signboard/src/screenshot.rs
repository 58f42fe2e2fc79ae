//! Screenshot-uploader seam.
//!
//! The tick loop paces screenshots: when the configured interval has elapsed
//! it asks the uploader to capture the screen and send it to the CMS. Capture
//! and network I/O run outside the resolver lock.

use thiserror::Error;

/// Errors reported by the screenshot collaborator.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    /// Capturing the framebuffer failed.
    #[error("screen capture failed: {0}")]
    CaptureFailed(String),

    /// Uploading the capture failed.
    #[error("screenshot upload failed: {0}")]
    UploadFailed(String),
}

/// Screenshot collaborator consumed by the tick loop.
pub trait ScreenshotUploader: Send + Sync {
    /// Capture the screen and send it to the CMS.
    fn capture_and_send(&self) -> Result<(), ScreenshotError>;
}
