use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use rollcall_core::{DataPaths, OnnxLocator};
use rollcall_hw::{Camera, FrameSource, V4lSource};
use rollcall_store::{AttendanceStore, ExportFormat, NewStudent, StudentUpdate};

mod report;
mod start;
mod train;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance: run the camera, manage students, read reports")]
struct Cli {
    /// Attendance database (default: $ROLLCALL_DB_PATH, then db_path in $ROLLCALL_CONFIG,
    /// then ~/.local/share/rollcall/attendance.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the recognition daemon and show its status until Ctrl-C
    Start {
        /// Path to the rollcalld binary
        #[arg(long)]
        daemon: Option<PathBuf>,
    },
    /// Manage registered students
    Student {
        #[command(subcommand)]
        command: StudentCommand,
    },
    /// Show attendance for a day, a date range, or one student
    Attendance {
        /// Day to show (default: today)
        #[arg(long, conflicts_with_all = ["from", "student"])]
        date: Option<NaiveDate>,
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
        /// Student id
        #[arg(long, conflicts_with_all = ["from", "to"])]
        student: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Headline attendance counts
    Stats,
    /// Attendance per day over the last N days
    Daily {
        #[arg(long, default_value_t = 7)]
        days: u64,
    },
    /// Recent recognition sessions
    Sessions {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Export attendance for a date range
    Export {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// csv, json or xlsx
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build a gallery file from a directory of labeled photos
    Train {
        /// Directory with one sub-directory of photos per person
        #[arg(long)]
        dataset: PathBuf,
        /// Gallery file to write
        #[arg(long)]
        out: PathBuf,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Run camera diagnostics
    Test {
        /// Also open this device and grab one frame
        #[arg(long)]
        device: Option<String>,
    },
}

#[derive(Subcommand)]
enum StudentCommand {
    /// Register a student
    Add {
        id: String,
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        batch: Option<String>,
    },
    /// List active students
    List,
    /// Show one student and their recent attendance
    Show { id: String },
    /// Change a student's details
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        batch: Option<String>,
    },
    /// Deactivate a student (history is kept)
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = DataPaths::from_env().context("invalid configuration")?;
    let db_path = resolve_db_path(cli.db, &paths);
    let open_store = || {
        AttendanceStore::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))
    };
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Start { daemon } => {
            let daemon = daemon.unwrap_or_else(start::locate_daemon);
            let counts = start::run(&daemon).await?;
            println!("{}", counts.summary_line());
        }
        Commands::Student { command } => run_student(command, &open_store()?)?,
        Commands::Attendance {
            date,
            from,
            to,
            student,
            limit,
        } => {
            let store = open_store()?;
            let records = match (student, from, to) {
                (Some(id), _, _) => store.student_attendance(&id, limit)?,
                (None, Some(from), Some(to)) => store.attendance_range(from, to)?,
                _ => store.attendance_by_date(date.unwrap_or(today))?,
            };
            print!("{}", report::attendance_table(&records));
        }
        Commands::Stats => {
            print!("{}", report::stats_summary(&open_store()?.stats(today)?));
        }
        Commands::Daily { days } => {
            print!("{}", report::daily_chart(&open_store()?.daily_counts(today, days)?));
        }
        Commands::Sessions { limit } => {
            print!("{}", report::session_table(&open_store()?.list_sessions(limit)?));
        }
        Commands::Export {
            from,
            to,
            format,
            out,
        } => {
            let records = open_store()?.attendance_range(from, to)?;
            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("cannot create {}", path.display()))?;
                    rollcall_store::write_records(file, &records, format)?;
                    println!("Exported {} records to {}", records.len(), path.display());
                }
                None => rollcall_store::write_records(std::io::stdout().lock(), &records, format)?,
            }
        }
        Commands::Train {
            dataset,
            out,
            model_dir,
        } => {
            let model_dir = model_dir.unwrap_or(paths.model_dir);
            let mut locator = OnnxLocator::load(
                &model_dir.join(rollcall_core::DETECTOR_MODEL),
                &model_dir.join(rollcall_core::EMBEDDER_MODEL),
            )
            .with_context(|| format!("failed to load face models from {}", model_dir.display()))?;

            let (gallery, summary) = train::build_gallery(&dataset, &mut locator)?;
            gallery.save(&out)?;
            println!(
                "Encoded {} images of {} people ({} skipped) into {}",
                summary.encoded,
                summary.people,
                summary.skipped,
                out.display()
            );
        }
        Commands::Test { device } => run_camera_test(device)?,
    }

    Ok(())
}

fn run_student(command: StudentCommand, store: &AttendanceStore) -> Result<()> {
    match command {
        StudentCommand::Add {
            id,
            name,
            email,
            phone,
            department,
            batch,
        } => {
            store.add_student(&NewStudent {
                student_id: id.clone(),
                name,
                email,
                phone,
                department,
                batch,
            })?;
            println!("Registered {id}");
        }
        StudentCommand::List => print!("{}", report::student_table(&store.list_students()?)),
        StudentCommand::Show { id } => {
            let student = store
                .get_student(&id)?
                .with_context(|| format!("no student with id {id}"))?;
            print!("{}", report::student_detail(&student));
            println!();
            print!("{}", report::attendance_table(&store.student_attendance(&id, Some(10))?));
        }
        StudentCommand::Update {
            id,
            name,
            email,
            phone,
            department,
            batch,
        } => {
            let update = StudentUpdate {
                name,
                email,
                phone,
                department,
                batch,
            };
            if !store.update_student(&id, &update)? {
                anyhow::bail!("no student with id {id}");
            }
            println!("Updated {id}");
        }
        StudentCommand::Remove { id } => {
            if !store.deactivate_student(&id)? {
                anyhow::bail!("no student with id {id}");
            }
            println!("Deactivated {id}");
        }
    }
    Ok(())
}

fn run_camera_test(device: Option<String>) -> Result<()> {
    println!("Scanning for video capture devices...");
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No capture devices found.");
    }
    for d in &devices {
        println!("  {}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }

    let Some(device) = device else {
        return Ok(());
    };
    let mut source = V4lSource::new(device, 640, 480);
    source.open()?;
    let frame = source.read();
    source.release();
    let frame = frame?;
    println!(
        "Captured frame #{} from {}: {}x{}",
        frame.sequence,
        source.describe(),
        frame.width,
        frame.height
    );
    std::io::stdout().flush()?;
    Ok(())
}

/// `--db` wins over the shared data paths the daemon also uses.
fn resolve_db_path(flag: Option<PathBuf>, paths: &DataPaths) -> PathBuf {
    flag.unwrap_or_else(|| paths.db_path.clone())
}
