use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use opencv::{
    highgui,
    prelude::*,
    videoio::VideoWriter,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trafficwatch::annotate;
use trafficwatch::billing::{self, LogGateway, NoticeOutcome, OwnerDirectory, StatusFilter};
use trafficwatch::deadline::Deadline;
use trafficwatch::helmet::{HelmetClassifier, RoboflowHelmetClassifier};
use trafficwatch::ocr::OcrSpaceReader;
use trafficwatch::plate::PlateReader;
use trafficwatch::registry::InsuranceRegistry;
use trafficwatch::replay::ReplayDetector;
use trafficwatch::sink;
use trafficwatch::video::FrameSource;
use trafficwatch::{Capabilities, Config, Detector, PaymentStatus, Pipeline, SortTracker, ViolationSink};

const WINDOW: &str = "trafficwatch";
const ESC: i32 = 27;

#[derive(Parser)]
#[command(
    name = "trafficwatch",
    about = "Traffic violation detection and challan management",
    version
)]
struct Cli {
    /// Path to configuration file (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Violation database, overrides `db_path` from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the violation pipeline over a video
    Process(ProcessArgs),
    /// List challans for persisted violations
    Challans {
        /// all, paid or unpaid
        #[arg(long, default_value = "all")]
        status: StatusFilter,
        /// Owner CSV with `Number Plate` and `Phone Number` columns
        #[arg(long)]
        owners: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Send SMS reminders for unpaid challans (dry run gateway)
    Notify {
        #[arg(long)]
        owners: PathBuf,
    },
    /// Mark a violation as paid
    Pay {
        id: i64,
        /// Mark it unpaid again instead
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Args)]
struct ProcessArgs {
    /// Path to video file
    #[arg(short, long)]
    input: PathBuf,

    /// Recorded detections (JSON) to replay instead of running a model
    #[arg(short, long)]
    detections: Option<PathBuf>,

    /// TorchScript YOLO weights, overrides `model_path` from the config
    #[arg(short, long)]
    weights: Option<PathBuf>,

    /// Expired-insurance registry CSV, overrides the config
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Annotated output video
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for per-violation evidence screenshots
    #[arg(short, long)]
    screenshots: Option<PathBuf>,

    /// Show the annotated stream; ESC stops
    #[arg(short, long)]
    visualize: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(db) = &cli.db {
        cfg.db_path = db.to_string_lossy().into_owned();
    }
    Ok(cfg)
}

fn build_detector(cfg: &Config, args: &ProcessArgs) -> anyhow::Result<Box<dyn Detector>> {
    if let Some(path) = &args.detections {
        return Ok(Box::new(ReplayDetector::from_file(path)?));
    }
    let weights = args
        .weights
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| cfg.model_path.clone());
    let Some(weights) = weights else {
        bail!("no detector: pass --detections or --weights (or set model_path)");
    };
    load_model(cfg, &weights)
}

#[cfg(feature = "torch")]
fn load_model(cfg: &Config, weights: &str) -> anyhow::Result<Box<dyn Detector>> {
    let detector = trafficwatch::yolo::YoloDetector::from_config(cfg, weights)
        .with_context(|| format!("loading model {weights}"))?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "torch"))]
fn load_model(_cfg: &Config, weights: &str) -> anyhow::Result<Box<dyn Detector>> {
    bail!("cannot load {weights}: built without the `torch` feature; use --detections")
}

fn remote_capabilities(
    cfg: &Config,
) -> (Option<Box<dyn PlateReader>>, Option<Box<dyn HelmetClassifier>>) {
    let timeout = cfg.capability_timeout();
    let plate_reader = OcrSpaceReader::from_config(cfg)
        .map(|r| Box::new(Deadline::new(Arc::new(r), timeout)) as Box<dyn PlateReader>);
    let helmet = RoboflowHelmetClassifier::from_config(cfg)
        .map(|h| Box::new(Deadline::new(Arc::new(h), timeout)) as Box<dyn HelmetClassifier>);
    (plate_reader, helmet)
}

fn process(mut cfg: Config, args: ProcessArgs) -> anyhow::Result<()> {
    if let Some(path) = &args.registry {
        cfg.expired_registry_path = path.to_string_lossy().into_owned();
    }
    let registry = InsuranceRegistry::from_csv_path(&cfg.expired_registry_path, &cfg.registry_column)?;
    let sink = ViolationSink::open(&cfg.db_path, registry)
        .with_context(|| format!("opening violation store {}", cfg.db_path))?;

    let mut source = FrameSource::open(&args.input)?;
    let detector = build_detector(&cfg, &args)?;
    let (plate_reader, helmet) = remote_capabilities(&cfg);
    let caps = Capabilities {
        detector,
        tracker: Box::new(SortTracker::from_config(&cfg)),
        plate_reader,
        helmet,
    };
    let mut pipeline = Pipeline::new(&cfg, source.fps(), caps, sink)?;

    let mut writer = match &args.output {
        Some(path) => {
            let fourcc = VideoWriter::fourcc('a', 'v', 'c', '1')?;
            let writer = VideoWriter::new(&path.to_string_lossy(), fourcc, source.fps(), source.size(), true)?;
            if !writer.is_opened()? {
                bail!("failed to open video writer {}", path.display());
            }
            Some(writer)
        }
        None => None,
    };
    if args.visualize {
        highgui::named_window(WINDOW, highgui::WINDOW_NORMAL)?;
    }

    let mut violations = 0usize;
    while let Some((frame_number, frame)) = source.next_frame()? {
        let outcome = pipeline
            .process_frame(&frame, frame_number)
            .with_context(|| format!("processing frame {frame_number}"))?;

        violations += outcome.events.len();
        if let Some(dir) = &args.screenshots {
            for event in &outcome.events {
                if let Err(e) = annotate::save_screenshot(dir, &event.record, &outcome.annotated) {
                    warn!(track_id = event.record.track_id, frame_number, error = %e, "screenshot failed");
                }
            }
        }
        if let Some(writer) = writer.as_mut() {
            writer.write(&outcome.annotated)?;
        }
        if args.visualize {
            highgui::imshow(WINDOW, &outcome.annotated)?;
            if highgui::wait_key(1)? == ESC {
                info!(frame_number, "stopped by user");
                break;
            }
        }
    }

    if let Some(mut writer) = writer {
        writer.release()?;
    }
    if args.visualize {
        highgui::destroy_all_windows()?;
    }
    info!(
        violations,
        tracks = pipeline.store().len(),
        db = %cfg.db_path,
        "finished"
    );
    Ok(())
}

fn load_owners(path: &Path) -> anyhow::Result<OwnerDirectory> {
    OwnerDirectory::from_csv_path(path).with_context(|| format!("loading owners {}", path.display()))
}

fn list_challans(cfg: &Config, status: StatusFilter, owners: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let conn = sink::open_store(&cfg.db_path)?;
    let list = billing::challans(&conn, status)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    let owners = owners.map(load_owners).transpose()?;
    println!(
        "{:<10} {:<12} {:<20} {:>6} {:<7} {:<20} {}",
        "CHALLAN", "PLATE", "VIOLATION", "FINE", "STATUS", "DATE", "PHONE"
    );
    for c in &list {
        let phone = owners
            .as_ref()
            .and_then(|o| o.phone_for(&c.plate))
            .unwrap_or("-");
        println!(
            "{:<10} {:<12} {:<20} {:>6} {:<7} {:<20} {}",
            c.challan_id, c.plate, c.violation, c.fine, c.status, c.date, phone
        );
    }
    let outstanding: u32 = list.iter().filter(|c| c.is_unpaid()).map(|c| c.fine).sum();
    println!("{} challans, ₹{} unpaid", list.len(), outstanding);
    Ok(())
}

fn notify(cfg: &Config, owners: &Path) -> anyhow::Result<()> {
    let conn = sink::open_store(&cfg.db_path)?;
    let list = billing::challans(&conn, StatusFilter::Only(PaymentStatus::Unpaid))?;
    let owners = load_owners(owners)?;
    let mut gateway = LogGateway::default();
    let reports = billing::dispatch_unpaid_notices(&list, &owners, &mut gateway);
    for report in &reports {
        match &report.outcome {
            NoticeOutcome::Sent { phone } => println!("{}: sent to {}", report.challan_id, phone),
            NoticeOutcome::MissingPhone => println!("{}: no phone number on file", report.challan_id),
            NoticeOutcome::Failed { phone, error } => {
                println!("{}: failed for {}: {}", report.challan_id, phone, error)
            }
        }
    }
    info!(sent = gateway.sent, total = reports.len(), "notices dispatched");
    Ok(())
}

fn pay(cfg: &Config, id: i64, undo: bool) -> anyhow::Result<()> {
    let conn = sink::open_store(&cfg.db_path)?;
    let status = if undo { PaymentStatus::Unpaid } else { PaymentStatus::Paid };
    if !billing::set_status(&conn, id, status)? {
        bail!("no violation with id {id}");
    }
    println!("{} marked {}", billing::challan_id(id), status);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trafficwatch=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    match cli.command {
        Command::Process(args) => process(cfg, args),
        Command::Challans { status, owners, json } => list_challans(&cfg, status, owners.as_deref(), json),
        Command::Notify { owners } => notify(&cfg, &owners),
        Command::Pay { id, undo } => pay(&cfg, id, undo),
    }
}
