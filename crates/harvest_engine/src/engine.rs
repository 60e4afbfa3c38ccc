use std::io;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use harvest_core::{ModelRegistry, RunSlot, TaskConfig};
use harvest_logging::{harvest_debug, harvest_error};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::collector::DEFAULT_PROBE_BATCH;
use crate::events::{ChannelProgressSink, EngineEvent, ProgressSink};
use crate::fetch::{FetchSettings, PageFetcher, ReqwestFetcher};
use crate::runner::{Confirm, ImageJob, ImageRunner, RunError, TextRunSettings, TextRunner};
use crate::FetchError;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub registry: ModelRegistry,
    pub text_fetch: FetchSettings,
    pub probe_fetch: FetchSettings,
    pub text: TextRunSettings,
    pub probe_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry: ModelRegistry::builtin(),
            text_fetch: FetchSettings::text(),
            probe_fetch: FetchSettings::probe(),
            text: TextRunSettings::default(),
            probe_batch_size: DEFAULT_PROBE_BATCH,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start async runtime: {0}")]
    Runtime(io::Error),
    #[error("failed to start engine thread: {0}")]
    Thread(io::Error),
    #[error("failed to build http client: {0}")]
    Client(#[from] FetchError),
}

enum EngineCommand {
    RunText {
        task: TaskConfig,
        confirm: Arc<dyn Confirm>,
        cancel: CancellationToken,
    },
    CollectImages {
        job: ImageJob,
        cancel: CancellationToken,
    },
    ResetImageSession,
}

/// Cancels whatever run the engine is currently executing. Cloneable so a
/// signal handler can hold one.
#[derive(Clone)]
pub struct Canceller {
    current: Arc<Mutex<CancellationToken>>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// Runs the engine on a background thread with its own tokio runtime.
/// Commands go in over a channel; [`EngineEvent`]s come back on another.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    current: Arc<Mutex<CancellationToken>>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let text_fetcher: Arc<dyn PageFetcher> = Arc::new(ReqwestFetcher::new(config.text_fetch)?);
        let probe_fetcher: Arc<dyn PageFetcher> =
            Arc::new(ReqwestFetcher::new(config.probe_fetch)?);
        Self::with_fetchers(
            config.registry,
            config.text,
            config.probe_batch_size,
            text_fetcher,
            probe_fetcher,
        )
    }

    /// Build an engine over caller-supplied fetchers.
    pub fn with_fetchers(
        registry: ModelRegistry,
        text: TextRunSettings,
        probe_batch_size: usize,
        text_fetcher: Arc<dyn PageFetcher>,
        probe_fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(EngineError::Runtime)?;

        let slot = RunSlot::new();
        let text_runner = Arc::new(TextRunner::new(
            Arc::new(registry),
            text_fetcher,
            text,
            slot.clone(),
        ));
        let image_runner = Arc::new(tokio::sync::Mutex::new(ImageRunner::new(
            probe_fetcher,
            probe_batch_size,
            slot,
        )));

        thread::Builder::new()
            .name("harvest-engine".to_string())
            .spawn(move || {
                while let Ok(command) = cmd_rx.recv() {
                    let event_tx = event_tx.clone();
                    match command {
                        EngineCommand::RunText {
                            task,
                            confirm,
                            cancel,
                        } => {
                            let runner = Arc::clone(&text_runner);
                            runtime.spawn(async move {
                                let sink: Arc<dyn ProgressSink> =
                                    Arc::new(ChannelProgressSink::new(event_tx.clone()));
                                let result = runner
                                    .run(&task, confirm.as_ref(), sink, &cancel)
                                    .await
                                    .map_err(report_error);
                                let _ = event_tx.send(EngineEvent::TextRunFinished(result));
                            });
                        }
                        EngineCommand::CollectImages { job, cancel } => {
                            let runner = Arc::clone(&image_runner);
                            runtime.spawn(async move {
                                let sink = ChannelProgressSink::new(event_tx.clone());
                                let result = match runner.try_lock() {
                                    Ok(mut runner) => runner
                                        .run(&job, &sink, &cancel)
                                        .await
                                        .map_err(report_error),
                                    Err(_) => Err(RunError::Busy.to_string()),
                                };
                                let _ = event_tx.send(EngineEvent::ImageRunFinished(result));
                            });
                        }
                        EngineCommand::ResetImageSession => {
                            let runner = Arc::clone(&image_runner);
                            runtime.spawn(async move {
                                runner.lock().await.reset_session();
                                harvest_debug!("image session reset");
                            });
                        }
                    }
                }
                harvest_debug!("engine command channel closed");
            })
            .map_err(EngineError::Thread)?;

        Ok(Self {
            cmd_tx,
            event_rx,
            current: Arc::new(Mutex::new(CancellationToken::new())),
        })
    }

    pub fn run_text(&self, task: TaskConfig, confirm: Arc<dyn Confirm>) {
        let cancel = self.fresh_token();
        let _ = self.cmd_tx.send(EngineCommand::RunText {
            task,
            confirm,
            cancel,
        });
    }

    pub fn collect_images(&self, job: ImageJob) {
        let cancel = self.fresh_token();
        let _ = self.cmd_tx.send(EngineCommand::CollectImages { job, cancel });
    }

    pub fn reset_image_session(&self) {
        let _ = self.cmd_tx.send(EngineCommand::ResetImageSession);
    }

    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    pub fn canceller(&self) -> Canceller {
        Canceller {
            current: Arc::clone(&self.current),
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block until the next event; `None` once the engine thread is gone.
    pub fn recv(&self) -> Option<EngineEvent> {
        self.event_rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }
}

fn report_error(err: RunError) -> String {
    harvest_error!("run failed: {err}");
    err.to_string()
}
