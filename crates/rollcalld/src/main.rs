use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rollcall_core::{FaceLocator, Gallery, NullLocator, OnnxLocator};
use rollcall_hw::V4lSource;
use rollcall_store::{AttendanceStore, SqliteRecorder};

mod config;
mod engine;
mod glyphs;
mod presenter;

use config::Config;
use engine::{Engine, EngineSettings, StopToken};
use presenter::{NullPresenter, Presenter, SnapshotPresenter};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the status protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env().context("invalid configuration")?;

    let gallery = Gallery::load(&config.paths.gallery_path)
        .with_context(|| format!("failed to load gallery {}", config.paths.gallery_path.display()))?;
    if gallery.is_empty() {
        tracing::warn!("gallery is empty; every face will be reported as unknown");
    }
    let gallery = Arc::new(gallery);

    let locator = select_locator(&config)?;

    let store = AttendanceStore::open(&config.paths.db_path)
        .with_context(|| format!("failed to open database {}", config.paths.db_path.display()))?;
    let session_id = store
        .create_session(chrono::Local::now().naive_local())
        .context("failed to start session")?;

    // The recorder owns its own connection; this one closes out the session.
    let recorder_store = AttendanceStore::open(&config.paths.db_path)?;
    let recorder = SqliteRecorder::new(recorder_store, config.late_policy(), config.unregistered)
        .with_session(session_id.clone());

    let presenter: Box<dyn Presenter> = match &config.snapshot_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "writing annotated snapshots");
            Box::new(SnapshotPresenter::new(path))
        }
        None => Box::new(NullPresenter),
    };

    let engine = Engine::new(
        Box::new(V4lSource::new(
            config.camera_device.clone(),
            config.frame_width,
            config.frame_height,
        )),
        locator,
        config.match_policy.matcher(),
        gallery,
        Box::new(recorder),
        presenter,
        EngineSettings {
            skip_factor: config.skip_factor,
            tolerance: config.tolerance,
            open_backoff: config.open_backoff,
            reconnect_delay: config.reconnect_delay,
        },
    );

    let stop = StopToken::new();
    let (handle, mut events) =
        engine::spawn_engine(engine, stop.clone()).context("failed to spawn engine thread")?;

    tracing::info!(
        session = %session_id,
        device = %config.camera_device,
        policy = ?config.match_policy,
        "rollcalld ready"
    );

    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            ctrl_c_stop.stop();
        }
    });

    // A plain thread: a pending stdin read must not hold up runtime shutdown.
    let stdin_stop = stop.clone();
    std::thread::Builder::new()
        .name("rollcall-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if matches!(line.trim(), "q" | "stop") {
                    tracing::info!("stop requested on stdin");
                    stdin_stop.stop();
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader")?;

    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        let written = writeln!(stdout, "{event}").and_then(|_| stdout.flush());
        if let Err(e) = written {
            // Nobody is listening any more; wind the loop down.
            tracing::warn!(error = %e, "status output closed");
            stop.stop();
        }
    }

    let summary = tokio::task::spawn_blocking(move || handle.join())
        .await?
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;

    store
        .end_session(
            &session_id,
            chrono::Local::now().naive_local(),
            summary.recognized,
            summary.unknown,
            None,
        )
        .context("failed to close session")?;

    tracing::info!(session = %session_id, "rollcalld shutting down");
    Ok(())
}

/// ONNX locator when both models are present, otherwise the stub.
fn select_locator(config: &Config) -> Result<Box<dyn FaceLocator>> {
    let detector = config.paths.detector_model_path();
    let embedder = config.paths.embedder_model_path();

    if !detector.exists() || !embedder.exists() {
        tracing::warn!(
            model_dir = %config.paths.model_dir.display(),
            "face models not found; running without face location"
        );
        return Ok(Box::new(NullLocator));
    }

    let locator = OnnxLocator::load(&detector, &embedder)
        .with_context(|| format!("failed to load face models from {}", config.paths.model_dir.display()))?;
    tracing::info!(detector = %detector.display(), embedder = %embedder.display(), "face models loaded");
    Ok(Box::new(locator))
}
