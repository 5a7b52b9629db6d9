//! rollcall-hw — Camera capture for the attendance loop.
//!
//! Provides V4L2 capture with YUYV/MJPG to RGB conversion and a
//! restartable [`FrameSource`] that the recognition loop reconnects
//! through when the device drops out.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::{FrameSource, V4lSource};
