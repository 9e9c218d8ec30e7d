//! Per-server lifecycle supervision.
//!
//! A controller owns the bounded queue between the log-stream client and
//! the votemap processor and runs both as one unit. Cancellation flows
//! through a child token; either side going down takes the other with it.

use std::sync::{Arc, Mutex};

use crcon::models::{LogMessageType, LogStreamObject};
use crcon::{BackoffConfig, CrconApi, LogStreamClient};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::messaging::{MessageSender, PlayerMatcher, PlayerProperties};
use crate::models::{ServerParameters, VipInfo, WeightingParameters};
use crate::processor::{VotemapProcessor, VotemapSettings};
use crate::vip::VipManager;
use crate::{Error, Result};

/// Dropping log events is not an option: the stream is authoritative for
/// match-lifecycle transitions, so producers block when this fills.
const QUEUE_SIZE: usize = 1000;

struct Worker<C: CrconApi> {
    processor: VotemapProcessor<C>,
    log_stream: LogStreamClient,
}

/// Controls a single CRCON server instance.
pub struct ServerController<C: CrconApi + 'static> {
    label: String,
    api: Arc<C>,
    settings: VotemapSettings,
    cancel: CancellationToken,
    stop_token: Option<CancellationToken>,
    run_ended_tx: watch::Sender<bool>,
    run_ended_rx: watch::Receiver<bool>,
    vip: tokio::sync::Mutex<VipManager<C>>,
    worker: Mutex<Option<Worker<C>>>,
}

impl<C: CrconApi + 'static> ServerController<C> {
    /// `stop_token`, when given, stops this controller as soon as it fires.
    pub fn new(
        params: ServerParameters,
        api: Arc<C>,
        backoff: BackoffConfig,
        stop_token: Option<CancellationToken>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel::<LogStreamObject>(QUEUE_SIZE);

        let settings = VotemapSettings::new();
        let processor = VotemapProcessor::new(queue_rx, api.clone(), settings.clone());

        let mut log_stream = LogStreamClient::new(params.connection.clone(), queue_tx, backoff);
        log_stream.log_types = Some(vec![LogMessageType::MatchStart, LogMessageType::MatchEnd]);

        let (run_ended_tx, run_ended_rx) = watch::channel(false);

        Self {
            label: params.label,
            api: api.clone(),
            settings,
            cancel: CancellationToken::new(),
            stop_token,
            run_ended_tx,
            run_ended_rx,
            vip: tokio::sync::Mutex::new(VipManager::new(api)),
            worker: Mutex::new(Some(Worker {
                processor,
                log_stream,
            })),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Supervises the processor and log-stream tasks until cancellation,
    /// queue shutdown or a permanent failure.
    pub async fn run(&self) -> Result<()> {
        let taken = self.worker.lock().ok().and_then(|mut guard| guard.take());
        let Some(Worker {
            mut processor,
            mut log_stream,
        }) = taken
        else {
            return Err(Error::orchestration(format!(
                "controller for server '{}' has already been run",
                self.label
            )));
        };

        info!(server = %self.label, "server controller starting");
        let cancel = self.cancel.clone();
        if self.stop_token.as_ref().is_some_and(|stop| stop.is_cancelled()) {
            cancel.cancel();
        }
        let mut tasks: JoinSet<(&'static str, Result<()>)> = JoinSet::new();

        if let Some(stop) = self.stop_token.clone() {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                tokio::select! {
                    _ = stop.cancelled() => {
                        info!("stop event signalled, stopping");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
                ("stop-event-monitor", Ok(()))
            });
        }

        {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                processor.run(cancel).await;
                ("votemap-processor", Ok(()))
            });
        }
        {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = log_stream.run(cancel).await.map_err(Error::Api);
                ("log-stream-client", result)
            });
        }

        let mut failure: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(server = %self.label, task = name, "task finished"),
                Ok((name, Err(e))) => {
                    error!(server = %self.label, task = name, error = %e, "task failed");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(join_error) => {
                    if !join_error.is_cancelled() {
                        error!(server = %self.label, error = %join_error, "task panicked");
                    }
                }
            }
            // one task ending winds down the whole unit
            self.cancel.cancel();
        }

        self.run_ended_tx.send_replace(true);
        info!(server = %self.label, "server controller stopped");
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Ask the controller to terminate without waiting.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Terminate and block until every supervised task has settled.
    pub async fn stop_and_wait(&self) {
        self.cancel.cancel();
        let mut ended = self.run_ended_rx.clone();
        let _ = ended.wait_for(|done| *done).await;
    }

    pub fn votemap_enabled(&self) -> bool {
        self.settings.enabled()
    }

    pub fn set_votemap_enabled(&self, enabled: bool) -> Result<()> {
        self.settings.set_enabled(enabled)
    }

    pub fn weighting_parameters(&self) -> Option<Arc<WeightingParameters>> {
        self.settings.weighting()
    }

    pub fn set_weighting_parameters(&self, params: Option<WeightingParameters>) {
        self.settings.set_weighting(params);
    }

    pub async fn send_group_message(
        &self,
        matcher: &PlayerMatcher,
        message: &str,
    ) -> Result<Vec<PlayerProperties>> {
        MessageSender::new(self.api.clone())
            .send_group_message(matcher, message)
            .await
    }

    pub async fn players_in_group(&self, matcher: &PlayerMatcher) -> Result<Vec<PlayerProperties>> {
        MessageSender::new(self.api.clone())
            .players_in_group(matcher)
            .await
    }

    pub async fn vip_info(&self, player_id_or_name: &str) -> Result<Option<VipInfo>> {
        self.vip
            .lock()
            .await
            .get_vip_by_name_or_id(player_id_or_name)
            .await
    }
}
