//! rollcall-core — Face matching and attendance rules.
//!
//! Holds the known-face gallery, the distance matcher, per-run
//! deduplication, and the recorder contract. Face location is a
//! capability behind [`FaceLocator`]; the ONNX-backed implementation
//! uses SCRFD for detection plus an embedding model for each face.

pub mod detector;
pub mod embedder;
pub mod gallery;
pub mod locator;
pub mod matcher;
pub mod recorder;
pub mod session;
pub mod settings;
pub mod types;

pub use gallery::{Gallery, GalleryEntry, GalleryError};
pub use locator::{FaceLocator, LocatorError, NullLocator, OnnxLocator};
pub use matcher::{FirstMatchMatcher, MatchError, MatchPolicy, Matcher, NearestMatcher, DEFAULT_TOLERANCE};
pub use recorder::{
    student_id_for, AttendanceStatus, LatePolicy, RecordError, RecordOutcome, Recorder,
    UnregisteredPolicy,
};
pub use session::SessionMarks;
pub use settings::{ConfigError, DataPaths, FileConfig};
pub use types::{DetectedFace, Embedding, FaceBox, MatchResult, UNKNOWN_LABEL};

/// Detector model file name inside the model directory.
pub const DETECTOR_MODEL: &str = "det_10g.onnx";
/// Embedding model file name inside the model directory.
pub const EMBEDDER_MODEL: &str = "w600k_r50.onnx";
