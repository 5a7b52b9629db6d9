//! Restartable frame source. Owns the camera handle exclusively.

use crate::camera::{Camera, CameraError};
use crate::frame::Frame;

/// A camera-like producer of frames at a fixed output resolution.
///
/// `open` may be called again after a failed `read` + `release` to
/// reconnect. `release` on a closed source is a no-op.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CameraError>;
    fn read(&mut self) -> Result<Frame, CameraError>;
    fn release(&mut self);
    /// Human-readable device name for logs.
    fn describe(&self) -> String;
}

/// V4L2-backed source that resizes every frame to `out_width` x `out_height`.
pub struct V4lSource {
    device_path: String,
    out_width: u32,
    out_height: u32,
    camera: Option<Camera>,
}

impl V4lSource {
    pub fn new(device_path: impl Into<String>, out_width: u32, out_height: u32) -> Self {
        Self {
            device_path: device_path.into(),
            out_width,
            out_height,
            camera: None,
        }
    }
}

impl FrameSource for V4lSource {
    fn open(&mut self) -> Result<(), CameraError> {
        self.release();
        self.camera = Some(Camera::open(&self.device_path, self.out_width, self.out_height)?);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CameraError> {
        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;
        camera
            .capture_frame()?
            .resized(self.out_width, self.out_height)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    fn release(&mut self) {
        if self.camera.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_before_open_is_not_open() {
        let mut source = V4lSource::new("/dev/rollcall-missing", 640, 480);
        assert!(matches!(source.read(), Err(CameraError::NotOpen)));
    }

    #[test]
    fn test_open_missing_device_fails_and_stays_closed() {
        let mut source = V4lSource::new("/dev/rollcall-missing", 640, 480);
        assert!(matches!(source.open(), Err(CameraError::DeviceNotFound(_))));
        assert!(matches!(source.read(), Err(CameraError::NotOpen)));
        source.release();
    }
}
