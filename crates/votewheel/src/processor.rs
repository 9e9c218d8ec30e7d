//! Event-driven votemap orchestration.
//!
//! The processor consumes log events from the controller's queue. On match
//! start it computes a fresh weighted selection and swaps it into the
//! server's vote-map whitelist long enough for the upstream to rebuild its
//! ballot, then restores the operator's curated whitelist. On match end it
//! records the finished layer in history.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crcon::models::{Layer, LogMessageType, LogStreamObject, ServerStatus, VoteMapUserConfig};
use crcon::CrconApi;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{cached, CacheHost, CacheKey, TtlCache};
use crate::history::LayerHistory;
use crate::models::WeightingParameters;
use crate::selector::MapSelector;
use crate::{Error, Result};

const STATUS_TTL: Duration = Duration::from_secs(10);
const MAPS_TTL: Duration = Duration::from_secs(8 * 60 * 60);
const VOTEMAP_CONFIG_TTL: Duration = Duration::from_secs(600);

/// Upstream needs a moment to observe each whitelist mutation.
const SWAP_SETTLE: Duration = Duration::from_secs(2);

/// Live-togglable processor state, shared between the processor task and the
/// controller that owns its setters.
///
/// Weighting parameters are an immutable value swapped atomically; a
/// selection already in flight keeps the reference it captured.
#[derive(Clone, Default)]
pub struct VotemapSettings {
    enabled: Arc<AtomicBool>,
    weighting: Arc<RwLock<Option<Arc<WeightingParameters>>>>,
}

impl VotemapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enabling requires weighting parameters to be configured.
    pub fn set_enabled(&self, value: bool) -> Result<()> {
        if value && self.weighting().is_none() {
            return Err(Error::NotConfigured);
        }
        self.enabled.store(value, Ordering::SeqCst);
        Ok(())
    }

    pub fn weighting(&self) -> Option<Arc<WeightingParameters>> {
        match self.weighting.read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    /// Clearing the parameters disables processing.
    pub fn set_weighting(&self, params: Option<WeightingParameters>) {
        if params.is_none() {
            self.enabled.store(false, Ordering::SeqCst);
        }
        if let Ok(mut guard) = self.weighting.write() {
            *guard = params.map(Arc::new);
        }
    }
}

/// Processes votemap selections for one server.
pub struct VotemapProcessor<C: CrconApi> {
    queue: mpsc::Receiver<LogStreamObject>,
    api: Arc<C>,
    settings: VotemapSettings,
    cache: TtlCache,
    history: LayerHistory,
}

impl<C: CrconApi> CacheHost for VotemapProcessor<C> {
    fn get_cache(&mut self, _cache_hint: Option<&str>) -> &mut TtlCache {
        &mut self.cache
    }
}

impl<C: CrconApi> VotemapProcessor<C> {
    pub fn new(
        queue: mpsc::Receiver<LogStreamObject>,
        api: Arc<C>,
        settings: VotemapSettings,
    ) -> Self {
        Self {
            queue,
            api,
            settings,
            cache: TtlCache::new(),
            history: LayerHistory::new(),
        }
    }

    /// Receive and process messages until the queue shuts down or
    /// cancellation fires. A failure while handling one message never stops
    /// the loop.
    pub async fn run(&mut self, cancel: CancellationToken) {
        loop {
            let log = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancellation received, shutting down");
                    return;
                }
                log = self.queue.recv() => match log {
                    None => {
                        info!("queue shut down, stopping");
                        return;
                    }
                    Some(log) => log,
                },
            };

            if let Err(e) = self.process_message(&log).await {
                error!(error = %e, action = ?log.log.action, "error processing message");
            }
        }
    }

    /// The log-stream filter and this dispatch must stay in sync: a type
    /// added to the filter needs a match arm here, and vice-versa. The
    /// filter is configured in the server controller.
    async fn process_message(&mut self, log: &LogStreamObject) -> Result<()> {
        debug!(action = ?log.log.action, "message received");
        match log.log.action {
            LogMessageType::MatchStart => {
                if self.settings.enabled() {
                    self.process_map_started().await?;
                } else {
                    debug!("votemap processing disabled, ignoring match start");
                }
            }
            LogMessageType::MatchEnd => self.process_map_ended().await?,
            other => warn!(action = ?other, "unsupported log message type"),
        }
        Ok(())
    }

    async fn process_map_started(&mut self) -> Result<()> {
        info!("processing map started");
        let selection = self.generate_selection().await?;
        if selection.is_empty() {
            debug!("no selection generated, skipping");
            return Ok(());
        }
        self.apply_selection(&selection).await
    }

    /// History accumulates in every state so that re-enabling is useful.
    async fn process_map_ended(&mut self) -> Result<()> {
        info!("processing map ended");
        let status = self.server_status().await?;
        info!(map = %status.map.id, "saving current map to layer history");
        self.history.record(status.map.id);
        Ok(())
    }

    async fn generate_selection(&mut self) -> Result<Vec<String>> {
        debug!("generating a votemap selection");
        let Some(weighting) = self.settings.weighting() else {
            return Ok(Vec::new());
        };

        let status = self.server_status().await?;
        let layers = self.server_maps().await?;
        let votemap_config = self.votemap_config().await?;
        // the whitelist is authoritative and mutated below, never cached
        let whitelist = self.api.get_votemap_whitelist().await?;

        let allowed: HashSet<&str> = whitelist.iter().map(String::as_str).collect();
        let layers: Vec<Layer> = layers
            .into_iter()
            .filter(|layer| allowed.contains(layer.id.as_str()))
            .collect();

        let recent = self.history.to_vec();
        let selector = MapSelector::new(&status, &layers, &weighting, &votemap_config, &recent);
        let selection = selector.get_selection(&mut rand::rng());
        debug!(selection = selection.join(","), "selection");
        Ok(selection)
    }

    /// The swap/reset/swap-back dance forces the upstream to rebuild its
    /// ballot from our short list without permanently replacing the
    /// operator's curated whitelist. The restore runs even when the swap or
    /// reset failed.
    async fn apply_selection(&mut self, selection: &[String]) -> Result<()> {
        info!(selection = selection.join(","), "setting votemap selection");
        let saved = self.api.get_votemap_whitelist().await?;
        info!(whitelist = saved.join(","), "saved votemap whitelist");

        let api = &self.api;
        let swap = async {
            debug!("setting votemap whitelist to the selection");
            api.set_votemap_whitelist(selection).await?;
            sleep(SWAP_SETTLE).await;
            debug!("resetting votemap state");
            api.reset_votemap_state().await
        };
        match swap.await {
            Ok(()) => info!("votemap selection set"),
            Err(e) => error!(error = %e, "error setting votemap selection"),
        }

        sleep(SWAP_SETTLE).await;
        debug!("restoring votemap whitelist");
        self.api.set_votemap_whitelist(&saved).await?;
        Ok(())
    }

    async fn server_status(&mut self) -> crcon::Result<ServerStatus> {
        debug!("getting server status");
        cached(
            &mut self.cache,
            CacheKey::new("get_server_status"),
            STATUS_TTL,
            self.api.get_status(),
        )
        .await
    }

    async fn server_maps(&mut self) -> crcon::Result<Vec<Layer>> {
        debug!("getting server maps");
        cached(
            &mut self.cache,
            CacheKey::new("get_server_maps"),
            MAPS_TTL,
            self.api.get_maps(),
        )
        .await
    }

    async fn votemap_config(&mut self) -> crcon::Result<VoteMapUserConfig> {
        debug!("getting votemap config");
        cached(
            &mut self.cache,
            CacheKey::new("get_votemap_config"),
            VOTEMAP_CONFIG_TTL,
            self.api.get_votemap_config(),
        )
        .await
    }
}
