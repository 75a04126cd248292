use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tracing::{info, warn};

use prodline_session::{
    Config, ControllerConfig, FileProvider, PipelineFactory, PipelineParts, RunSpec,
    SessionController,
};
use prodline_vision::engine::{EngineConfig, IouTracker, ReplayDetector};
use prodline_vision::sink::{video_output_path, FfmpegSink};
use prodline_vision::source::{FfmpegSource, SourceSpec};
use prodline_vision::{TrackingEngine, PROC_H, PROC_W};

#[derive(Debug, Parser)]
#[command(name = "prodline", version, about = "Production line boundary counting")]
struct Cli {
    #[arg(long, default_value = "config.txt")]
    config: String,

    #[arg(long, default_value = "input.txt")]
    input: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the deployment: config/input files, model reference, ffmpeg.
    Doctor,
    /// Print the loaded configuration and line inputs.
    Inspect,
    /// Run one counting session until Ctrl-C, then print the report.
    Run {
        #[arg(long)]
        item_code: String,
        /// Product selector, "<class id>: <name>".
        #[arg(long)]
        product: String,
        #[arg(long, default_value_t = 3)]
        line: u32,
        #[arg(long, default_value = "output")]
        output_root: String,
        #[arg(long, default_value = "report")]
        report_root: String,
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let provider = FileProvider::new(&cli.config, &cli.input);

    match cli.cmd {
        Command::Doctor => doctor(&provider),
        Command::Inspect => inspect(&provider),
        Command::Run { item_code, product, line, output_root, report_root, fps } => {
            run(provider, item_code, product, line, output_root, report_root, fps).await
        }
    }
}

fn doctor(provider: &FileProvider) -> Result<()> {
    info!("doctor: starting");

    let (config, inputs) = provider.load().context("load configuration")?;
    info!("doctor: config OK (source {:?}, threshold {})", config.source, config.conf_threshold);
    info!("doctor: inputs OK (operators {:?})", inputs.operators);

    let model = Path::new(&config.model_ref);
    if model.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        anyhow::ensure!(model.exists(), "detection replay {} missing", model.display());
        ReplayDetector::open(model).context("detection replay unreadable")?;
        info!("doctor: detection replay OK");
    } else {
        warn!("doctor: model reference {:?} needs an external detector backend", config.model_ref);
    }

    let ffmpeg = std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
    anyhow::ensure!(
        matches!(ffmpeg, Ok(s) if s.success()),
        "ffmpeg not runnable; frame capture and encoding need it on PATH"
    );
    info!("doctor: ffmpeg OK");

    info!("doctor: OK");
    Ok(())
}

fn inspect(provider: &FileProvider) -> Result<()> {
    let (config, inputs) = provider.load()?;
    println!("source={}", config.source);
    println!("model={}", config.model_ref);
    println!("conf_threshold={}", config.conf_threshold);
    println!("text_size={}", config.text_size);
    println!("operators={}", inputs.operators);
    println!("baskets={}", inputs.baskets);
    println!("demand={}", inputs.demand);
    println!("temperature={}", inputs.temperature);
    Ok(())
}

async fn run(
    provider: FileProvider,
    item_code: String,
    product: String,
    line: u32,
    output_root: String,
    report_root: String,
    fps: u32,
) -> Result<()> {
    let cfg = ControllerConfig {
        line_number: line,
        report_root,
        ..ControllerConfig::default()
    };
    let factory = LinePipelineFactory { output_root, fps };
    let mut ctl = SessionController::new(provider, Box::new(factory), cfg)
        .context("initialize session controller")?;

    ctl.start(RunSpec { item_code, product: product.clone() })?;
    let selected_class = ctl.session().map(|s| s.selected_class).unwrap_or_default();
    let live = ctl.live();
    info!("run: session started, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("run: stop requested");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                info!("run: count {}", live.snapshot().display_for(selected_class));
                if let Some(status) = ctl.loop_status() {
                    if let Some(exit) = status.exit {
                        warn!("run: processing loop ended on its own ({:?})", exit);
                        break;
                    }
                }
            }
        }
    }

    match ctl.stop().await? {
        Some(report) => print!("{}", report.render()),
        None => warn!("run: no session to report"),
    }
    Ok(())
}

/// Real pipeline wiring: ffmpeg capture, ffmpeg encode, bundled IOU tracking
/// engine over the configured detection backend.
struct LinePipelineFactory {
    output_root: String,
    fps: u32,
}

impl PipelineFactory for LinePipelineFactory {
    fn build(&mut self, cfg: &Config, selected_class: i32) -> Result<PipelineParts> {
        let spec = SourceSpec::parse(&cfg.source);
        let source = FfmpegSource::open(&spec)?;

        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let path = video_output_path(&self.output_root, now);
        let sink = FfmpegSink::create(&path, PROC_W, PROC_H, self.fps)?;

        let engine = build_engine(cfg, selected_class)?;
        Ok(PipelineParts { source: Box::new(source), sink: Box::new(sink), engine })
    }
}

fn build_engine(cfg: &Config, selected_class: i32) -> Result<Box<dyn TrackingEngine>> {
    let model = Path::new(&cfg.model_ref);
    anyhow::ensure!(
        model.extension().and_then(|e| e.to_str()) == Some("jsonl"),
        "unsupported model reference {:?}: only detection replay files (.jsonl) are built in",
        cfg.model_ref
    );
    let detector = ReplayDetector::open(model)?;
    let engine_cfg = EngineConfig { target_class: Some(selected_class), ..EngineConfig::default() };
    Ok(Box::new(IouTracker::new(engine_cfg, Box::new(detector))))
}
