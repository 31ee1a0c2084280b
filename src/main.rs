use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::net::TcpListener;

use ldc_evm::{
    discover_port, logging, publish, CsvSink, CycleReport, Evm, FrameErrorPolicy, Mode, Publisher,
    Reading, Session, SessionConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "ldc-evm-logger",
    about = "Log inductive sensor data from TI's LDC/FDC EVM boards"
)]
struct Args {
    /// Output file (CSV); defaults to `data.csv`
    filename: Option<PathBuf>,
    /// TOML session configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial device of the EVM (skips USB discovery)
    #[arg(long)]
    serial: Option<String>,
    /// Channel mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// Serve normalized readings to TCP listeners
    #[arg(long)]
    publish: bool,
    /// Address to serve readings on
    #[arg(long)]
    host: Option<String>,
    /// Port to serve readings on
    #[arg(long)]
    port: Option<u16>,
    /// End the session when the board flags a streaming frame
    #[arg(long)]
    abort_on_frame_error: bool,
    /// Stop after this many streaming frames
    #[arg(long)]
    frames: Option<u64>,
    /// Do not print readings to stdout
    #[arg(long, short)]
    quiet: bool,
    /// Log level (overrides LDC_EVM_LOG / RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply_to(&self, config: &mut SessionConfig) {
        if let Some(filename) = &self.filename {
            config.output = filename.clone();
        }
        if let Some(serial) = &self.serial {
            config.serial = Some(serial.clone());
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if self.publish {
            config.publish.enabled = true;
        }
        if let Some(host) = &self.host {
            config.publish.host = host.clone();
        }
        if let Some(port) = self.port {
            config.publish.port = port;
        }
        if self.abort_on_frame_error {
            config.frame_errors = FrameErrorPolicy::Abort;
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_level.as_deref());

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    args.apply_to(&mut config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("tokio runtime init failed")?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping after the current frame");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let publisher = if config.publish.enabled {
        let address = config.publish.address();
        let listener = runtime
            .block_on(TcpListener::bind(&address))
            .with_context(|| format!("Failed to listen on {address}"))?;
        let publisher = Publisher::new(config.publish.capacity);
        let serving = publisher.clone();
        runtime.spawn(async move {
            if let Err(e) = publish::serve(listener, serving).await {
                warn!("Publisher stopped: {e}");
            }
        });
        info!("Publishing normalized readings on {address}");
        Some(publisher)
    } else {
        None
    };

    let port = match &config.serial {
        Some(port) => port.clone(),
        None => discover_port()?,
    };
    let evm = Evm::connect_serial(&port, config.baud_rate, config.timeout())
        .with_context(|| format!("Failed to open EVM at {port}"))?;
    let sink = CsvSink::open(&config.output, config.mode.stream_channels())
        .with_context(|| format!("Failed to open {}", config.output.display()))?;

    let mut session = Session::new(evm, sink, config.mode)
        .frame_errors(config.frame_errors)
        .stop_signal(stop);
    if let Some(publisher) = publisher {
        session = session.publisher(publisher);
    }
    if let Some(frames) = args.frames {
        session = session.frame_limit(frames);
    }
    if !args.quiet {
        session = session.observer(print_cycle);
    }

    let (result, sink) = session.run();
    runtime.shutdown_background();
    let summary = result?;

    println!(
        "Done. {} frames ({} flagged), {} rows written to {}",
        summary.frames,
        summary.flagged_frames,
        summary.rows,
        sink.path().display()
    );
    Ok(())
}

fn print_cycle(report: &CycleReport<'_>) {
    let line = report
        .readings
        .iter()
        .filter(|r| !matches!(r, Reading::Invalid))
        .map(Reading::to_string)
        .collect::<Vec<_>>()
        .join(" | ");
    if !line.is_empty() {
        println!("{line}");
    }
}
