use crate::presenter::{Annotation, Presenter};
use chrono::NaiveDateTime;
use rollcall_core::matcher::validate_embedding;
use rollcall_core::{
    AttendanceStatus, FaceLocator, Gallery, LocatorError, MatchError, Matcher, RecordError,
    RecordOutcome, Recorder, SessionMarks,
};
use rollcall_hw::{Frame, FrameSource};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Granularity of stop checks while waiting.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face location failed: {0}")]
    Locator(#[from] LocatorError),
    #[error("matching failed: {0}")]
    Match(#[from] MatchError),
}

/// One line of the status protocol written to stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    CameraStarted,
    WaitingForCamera,
    CameraLost,
    Marked { name: String, status: AttendanceStatus },
    AlreadyMarked { name: String },
    UnknownFace,
    Rejected { name: String },
    StorageError { message: String },
    Stopped { recognized: u64, unknown: u64 },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::CameraStarted => f.write_str("Camera started"),
            StatusEvent::WaitingForCamera => f.write_str("Waiting for camera..."),
            StatusEvent::CameraLost => f.write_str("Camera lost, reconnecting..."),
            StatusEvent::Marked { name, status } => write!(f, "Marked: {name} ({status})"),
            StatusEvent::AlreadyMarked { name } => write!(f, "Already marked: {name}"),
            StatusEvent::UnknownFace => f.write_str("Unknown face seen"),
            StatusEvent::Rejected { name } => write!(f, "Rejected: {name}"),
            StatusEvent::StorageError { message } => write!(f, "Storage error: {message}"),
            StatusEvent::Stopped { recognized, unknown } => {
                write!(f, "Stopped: recognized={recognized} unknown={unknown}")
            }
        }
    }
}

/// Cloneable stop flag shared between the engine thread and whoever stops it.
#[derive(Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, waking early on stop. Returns `true` if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

/// Loop timing and matching knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub skip_factor: u64,
    pub tolerance: f32,
    pub open_backoff: Duration,
    pub reconnect_delay: Duration,
}

/// Counts reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    /// Labels newly marked during this run.
    pub recognized: u64,
    /// Unknown face sightings.
    pub unknown: u64,
    pub reconnects: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AwaitingCamera,
    Running,
    DeviceLost,
    Stopped,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// The capture → locate → match → record → present pipeline for one camera.
pub struct Engine {
    source: Box<dyn FrameSource>,
    locator: Box<dyn FaceLocator>,
    matcher: Box<dyn Matcher>,
    gallery: Arc<Gallery>,
    recorder: Box<dyn Recorder>,
    presenter: Box<dyn Presenter>,
    settings: EngineSettings,
    clock: Clock,
    marks: SessionMarks,
    summary: RunSummary,
}

impl Engine {
    pub fn new(
        source: Box<dyn FrameSource>,
        locator: Box<dyn FaceLocator>,
        matcher: Box<dyn Matcher>,
        gallery: Arc<Gallery>,
        recorder: Box<dyn Recorder>,
        presenter: Box<dyn Presenter>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            source,
            locator,
            matcher,
            gallery,
            recorder,
            presenter,
            settings: EngineSettings {
                skip_factor: settings.skip_factor.max(1),
                ..settings
            },
            clock: Box::new(|| chrono::Local::now().naive_local()),
            marks: SessionMarks::new(),
            summary: RunSummary::default(),
        }
    }

    /// Replace the wall clock used to timestamp attendance.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Run until `stop` is set. Camera failures never end the loop.
    pub fn run(&mut self, stop: &StopToken, events: &mpsc::UnboundedSender<StatusEvent>) -> RunSummary {
        let emit = |event: StatusEvent| {
            // The receiver going away must not stop capture.
            let _ = events.send(event);
        };

        let mut state = LoopState::AwaitingCamera;
        while state != LoopState::Stopped {
            if stop.is_stopped() {
                state = LoopState::Stopped;
                continue;
            }
            state = match state {
                LoopState::AwaitingCamera => match self.source.open() {
                    Ok(()) => {
                        tracing::info!(device = %self.source.describe(), "camera started");
                        emit(StatusEvent::CameraStarted);
                        LoopState::Running
                    }
                    Err(e) => {
                        tracing::warn!(device = %self.source.describe(), error = %e, "camera unavailable");
                        emit(StatusEvent::WaitingForCamera);
                        stop.sleep(self.settings.open_backoff);
                        LoopState::AwaitingCamera
                    }
                },
                LoopState::Running => match self.source.read() {
                    Ok(frame) => {
                        for event in self.process_frame(&frame) {
                            emit(event);
                        }
                        LoopState::Running
                    }
                    Err(e) => {
                        tracing::warn!(device = %self.source.describe(), error = %e, "frame read failed");
                        emit(StatusEvent::CameraLost);
                        LoopState::DeviceLost
                    }
                },
                LoopState::DeviceLost => {
                    self.source.release();
                    self.summary.reconnects += 1;
                    stop.sleep(self.settings.reconnect_delay);
                    LoopState::AwaitingCamera
                }
                LoopState::Stopped => LoopState::Stopped,
            };
        }

        self.source.release();
        let summary = self.summary.clone();
        tracing::info!(
            frames = summary.frames,
            recognized = summary.recognized,
            unknown = summary.unknown,
            reconnects = summary.reconnects,
            "engine stopped"
        );
        emit(StatusEvent::Stopped {
            recognized: summary.recognized,
            unknown: summary.unknown,
        });
        summary
    }

    /// Handle one frame and return the status events it produced.
    ///
    /// Only every `skip_factor`-th frame goes through location; the rest
    /// are presented as skipped. A location or matching error skips that
    /// frame only.
    fn process_frame(&mut self, frame: &Frame) -> Vec<StatusEvent> {
        self.summary.frames += 1;
        if self.summary.frames % self.settings.skip_factor != 0 {
            self.presenter.present(frame, None);
            return Vec::new();
        }

        let mut events = Vec::new();
        match self.annotate(frame, &mut events) {
            Ok(annotations) => self.presenter.present(frame, Some(annotations.as_slice())),
            Err(e) => {
                tracing::warn!(sequence = frame.sequence, error = %e, "frame skipped");
                self.presenter.present(frame, None);
            }
        }
        events
    }

    fn annotate(&mut self, frame: &Frame, events: &mut Vec<StatusEvent>) -> Result<Vec<Annotation>, EngineError> {
        let faces = self.locator.locate(&frame.data, frame.width, frame.height)?;
        for face in &faces {
            validate_embedding(&face.embedding, self.gallery.dim())?;
        }

        let mut annotations = Vec::with_capacity(faces.len());
        for face in faces {
            let result = self
                .matcher
                .compare(&face.embedding, self.gallery.entries(), self.settings.tolerance);

            if result.is_unknown() {
                self.summary.unknown += 1;
                events.push(StatusEvent::UnknownFace);
            } else if self.marks.should_attempt(&result.label) {
                if let Some(event) = self.record(&result.label, result.confidence()) {
                    events.push(event);
                }
            }

            annotations.push(Annotation {
                face_box: face.face_box,
                known: !result.is_unknown(),
                label: result.label,
            });
        }
        Ok(annotations)
    }

    /// Record a first sighting. Storage failures leave the label unmarked
    /// so a later frame retries it.
    fn record(&mut self, label: &str, confidence: Option<f32>) -> Option<StatusEvent> {
        let at = (self.clock)();
        match self.recorder.record(label, at, confidence) {
            Ok(RecordOutcome::Recorded { status, late_minutes }) => {
                tracing::info!(label, %status, late_minutes, ?confidence, "marked");
                self.marks.mark_attempted(label);
                self.summary.recognized += 1;
                Some(StatusEvent::Marked {
                    name: label.to_string(),
                    status,
                })
            }
            Ok(RecordOutcome::AlreadyMarked) => {
                self.marks.mark_attempted(label);
                Some(StatusEvent::AlreadyMarked {
                    name: label.to_string(),
                })
            }
            Err(RecordError::Unregistered(_)) => {
                tracing::warn!(label, "rejected unregistered identity");
                self.marks.mark_attempted(label);
                Some(StatusEvent::Rejected {
                    name: label.to_string(),
                })
            }
            Err(RecordError::Storage(message)) => {
                tracing::error!(label, error = %message, "attendance write failed; will retry");
                Some(StatusEvent::StorageError { message })
            }
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Status events are delivered on the returned unbounded receiver; it
/// closes once the loop has stopped and emitted its final event.
pub fn spawn_engine(
    mut engine: Engine,
    stop: StopToken,
) -> std::io::Result<(JoinHandle<RunSummary>, mpsc::UnboundedReceiver<StatusEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let summary = engine.run(&stop, &tx);
            tracing::info!("engine thread exiting");
            summary
        })?;
    Ok((handle, rx))
}
