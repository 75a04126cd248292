use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use prodline_count::{CounterConfig, LiveCounts};
use prodline_report::ProductionReport;
use prodline_vision::annotate::Annotator;

use crate::cancel::CancelToken;
use crate::config::{Config, FileProvider, InputParams};
use crate::pipeline::{run_loop, LoopExit, LoopParams, LoopStatus, PipelineFactory};
use crate::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// What the operator picked for one counting run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub item_code: String,
    /// Product selector in the engine's "<class id>: <name>" form.
    pub product: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub started: OffsetDateTime,
    pub item_code: String,
    pub product: String,
    pub selected_class: i32,
}

struct ActiveRun {
    session: Session,
    cancel: CancelToken,
    handle: JoinHandle<LoopExit>,
    status: Arc<Mutex<LoopStatus>>,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub line_number: u32,
    pub report_root: String,
    /// How long `stop()` waits for the loop to acknowledge cancellation.
    pub stop_timeout: Duration,
    pub counter: CounterConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            line_number: 3,
            report_root: "report".into(),
            stop_timeout: Duration::from_secs(5),
            counter: CounterConfig::default(),
        }
    }
}

/// Owns the session lifecycle: Idle -> start -> Running -> stop -> Idle,
/// with at most one frame loop alive at any time.
pub struct SessionController {
    cfg: ControllerConfig,
    provider: FileProvider,
    config: Config,
    inputs: InputParams,
    factory: Box<dyn PipelineFactory>,
    live: LiveCounts,
    active: Option<ActiveRun>,
}

impl SessionController {
    pub fn new(
        provider: FileProvider,
        factory: Box<dyn PipelineFactory>,
        cfg: ControllerConfig,
    ) -> Result<Self, SessionError> {
        let (config, inputs) = provider.load()?;
        Ok(Self {
            cfg,
            provider,
            config,
            inputs,
            factory,
            live: LiveCounts::new(),
            active: None,
        })
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() { SessionState::Running } else { SessionState::Idle }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn inputs(&self) -> &InputParams {
        &self.inputs
    }

    /// Cloneable handle for poll-based consumers (display and the like).
    pub fn live(&self) -> LiveCounts {
        self.live.clone()
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Progress of the running loop, if any. An `exit` value while the
    /// state is still Running means the loop died on its own (source gone,
    /// sink failed) and the session is waiting for `stop()`.
    pub fn loop_status(&self) -> Option<LoopStatus> {
        self.active.as_ref().map(|a| a.status.lock().unwrap().clone())
    }

    /// Launch the frame loop for one session. Rejected while a session is
    /// already running; never two loops at once.
    pub fn start(&mut self, run: RunSpec) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let selected_class = parse_product_class(&run.product)?;

        // fresh sentinel before the loop publishes anything
        self.live.reset();

        let parts = self.factory.build(&self.config, selected_class)?;
        let params = LoopParams {
            selected_class,
            conf_threshold: self.config.conf_threshold,
            annotator: Annotator::new(self.config.text_size, self.cfg.counter.line_frac),
            counter: self.cfg.counter.clone(),
        };

        let session = Session {
            started: now(),
            item_code: run.item_code,
            product: run.product,
            selected_class,
        };
        let cancel = CancelToken::new();
        let status = Arc::new(Mutex::new(LoopStatus::default()));

        let live = self.live.clone();
        let loop_cancel = cancel.clone();
        let loop_status = status.clone();
        let handle =
            tokio::task::spawn_blocking(move || run_loop(parts, params, loop_cancel, live, loop_status));

        info!(
            "session: started for item {:?} product {:?} (class {})",
            session.item_code, session.product, selected_class
        );
        self.active = Some(ActiveRun { session, cancel, handle, status });
        Ok(())
    }

    /// Stop the running session and produce its report. A no-op returning
    /// `Ok(None)` when no session is running.
    pub async fn stop(&mut self) -> Result<Option<ProductionReport>, SessionError> {
        let Some(run) = self.active.take() else {
            return Ok(None);
        };
        run.cancel.cancel();

        let incomplete = match tokio::time::timeout(self.cfg.stop_timeout, run.handle).await {
            Ok(Ok(exit)) => {
                info!("session: loop acknowledged stop ({:?})", exit);
                false
            }
            Ok(Err(e)) => {
                // the loop panicked or was aborted; its last published count
                // is as suspect as on a timeout
                warn!("session: loop task failed: {}", e);
                true
            }
            Err(_) => {
                warn!(
                    "session: loop did not acknowledge cancellation within {:?}; report may be incomplete",
                    self.cfg.stop_timeout
                );
                true
            }
        };

        let end = now();
        let start = run.session.started;
        let duration = (end - start).max(time::Duration::ZERO);
        let produced = self.live.snapshot().produced(run.session.selected_class);

        let report = ProductionReport {
            item_code: run.session.item_code,
            product_name: run.session.product,
            demand: self.inputs.demand.clone(),
            produced,
            temperature: self.inputs.temperature.clone(),
            baskets: self.inputs.baskets.clone(),
            line_number: self.cfg.line_number,
            staff: self.inputs.operators.clone(),
            start,
            end,
            duration,
            incomplete,
        };
        report.save(&self.cfg.report_root).map_err(SessionError::Other)?;
        Ok(Some(report))
    }

    /// Stop any running session, then reload configuration and inputs from
    /// the backing files and reset the live count.
    pub async fn refresh(&mut self) -> Result<Option<ProductionReport>, SessionError> {
        let report = if self.active.is_some() { self.stop().await? } else { None };

        let (config, inputs) = self.provider.load()?;
        self.config = config;
        self.inputs = inputs;
        self.live.reset();
        info!("session: configuration and inputs reloaded");
        Ok(report)
    }
}

fn parse_product_class(product: &str) -> Result<i32, SessionError> {
    product
        .split_once(':')
        .and_then(|(id, _)| id.trim().parse::<i32>().ok())
        .ok_or_else(|| SessionError::BadProduct(product.to_string()))
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
