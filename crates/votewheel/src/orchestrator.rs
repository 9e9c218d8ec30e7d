//! Fan-out of server controllers over the configured servers.
//!
//! One controller runs per persisted server record. Management mutations
//! write through to the store and, when the affected controller is live,
//! propagate without a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crcon::{ApiClient, BackoffConfig, CrconApi, ServerConnectionDetails};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::controller::ServerController;
use crate::models::{ServerRecord, WeightingParameters};
use crate::repo::ServerRepository;
use crate::{Error, Result};

struct ControllerEntry {
    controller: Arc<ServerController<ApiClient>>,
    task: JoinHandle<()>,
}

pub struct Orchestrator<R: ServerRepository> {
    repo: Arc<R>,
    /// Fires when the whole process should wind down: externally via the
    /// signal handler, or internally when a controller fails permanently.
    shutdown: CancellationToken,
    backoff: BackoffConfig,
    controllers: tokio::sync::Mutex<HashMap<String, ControllerEntry>>,
    first_fatal: Arc<Mutex<Option<Error>>>,
}

impl<R: ServerRepository> Orchestrator<R> {
    pub fn new(repo: Arc<R>, stop: CancellationToken, backoff: BackoffConfig) -> Self {
        Self {
            repo,
            shutdown: stop.child_token(),
            backoff,
            controllers: tokio::sync::Mutex::new(HashMap::new()),
            first_fatal: Arc::new(Mutex::new(None)),
        }
    }

    /// Launches one controller per configured server and runs until the stop
    /// token fires or a controller fails permanently.
    pub async fn run(&self) -> Result<()> {
        info!("orchestrator started");
        for record in self.repo.list().await? {
            let label = record.label.clone();
            if let Err(e) = self.start_controller(record).await {
                warn!(server = %label, error = %e, "failed to start server controller");
            }
        }

        self.shutdown.cancelled().await;
        self.shutdown_controllers().await;
        info!("orchestrator stopped");

        let fatal = self
            .first_fatal
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn start_controller(&self, record: ServerRecord) -> Result<()> {
        let api = Arc::new(ApiClient::new(record.connection.clone()));
        let controller = Arc::new(ServerController::new(
            record.parameters(),
            api,
            self.backoff.clone(),
            Some(self.shutdown.clone()),
        ));

        if let Some(params) = record.weighting_parameters.clone() {
            controller.set_weighting_parameters(Some(params));
            if record.votemap_enabled {
                controller.set_votemap_enabled(true)?;
            }
        }

        let task = {
            let controller = controller.clone();
            let shutdown = self.shutdown.clone();
            let first_fatal = self.first_fatal.clone();
            tokio::spawn(async move {
                if let Err(e) = controller.run().await {
                    error!(server = %controller.label(), error = %e, "server controller failed");
                    if let Ok(mut slot) = first_fatal.lock() {
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                    shutdown.cancel();
                }
            })
        };

        self.controllers
            .lock()
            .await
            .insert(record.label, ControllerEntry { controller, task });
        Ok(())
    }

    async fn shutdown_controllers(&self) {
        let mut controllers = self.controllers.lock().await;
        for (label, entry) in controllers.drain() {
            entry.controller.stop_and_wait().await;
            if let Err(e) = entry.task.await {
                if !e.is_cancelled() {
                    error!(server = %label, error = %e, "controller task panicked");
                }
            }
            info!(server = %label, "server controller stopped");
        }
    }

    /// Adds a server after probing it with a health-check call. The record
    /// takes the name the server reports.
    pub async fn add_server(
        &self,
        label: &str,
        connection: ServerConnectionDetails,
    ) -> Result<String> {
        let probe = ApiClient::new(connection.clone());
        let status = probe.get_status().await.map_err(|e| {
            Error::orchestration(format!(
                "unable to connect to the server with the details provided: {e}"
            ))
        })?;

        let record = ServerRecord::new(label, status.name.clone(), connection)?;
        self.repo.insert(record).await.map_err(|e| match e {
            Error::Datastore(d) => {
                warn!(error = %d, "unable to add server");
                Error::orchestration(format!("unable to add server {}: {d}", status.name))
            }
            other => other,
        })?;
        Ok(status.name)
    }

    /// Deletes the record and stops the live controller, if any.
    pub async fn remove_server(&self, label: &str) -> Result<()> {
        self.repo.delete(label).await.map_err(|e| match e {
            Error::Datastore(d) => Error::orchestration(format!("unable to remove server {label}: {d}")),
            other => other,
        })?;
        if let Some(entry) = self.controllers.lock().await.remove(label) {
            entry.controller.stop_and_wait().await;
            let _ = entry.task.await;
            info!(server = %label, "server controller stopped after removal");
        }
        Ok(())
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        self.repo.list().await
    }

    pub async fn get_server(&self, label: &str) -> Result<Option<ServerRecord>> {
        self.repo.find(label).await
    }

    /// The stored weighting parameters as pretty JSON, for download.
    pub async fn get_weighting_parameters_json(&self, label: &str) -> Result<String> {
        let record = self.require_server(label).await?;
        let params = record.weighting_parameters.ok_or_else(|| {
            Error::orchestration(format!("server {label} does not have any votemap settings"))
        })?;
        Ok(serde_json::to_string_pretty(&params)?)
    }

    /// Validates and stores uploaded weighting parameters, updating the live
    /// controller in place when there is one.
    pub async fn upload_weighting_parameters(
        &self,
        label: &str,
        file_contents: &str,
    ) -> Result<ServerRecord> {
        let params = WeightingParameters::from_json(file_contents)?;

        let mut record = self.require_server(label).await?;
        record.weighting_parameters = Some(params.clone());
        self.repo.update(record.clone()).await.map_err(|_| {
            Error::orchestration(format!("unable to save votemap settings for server {label}"))
        })?;

        if let Some(entry) = self.controllers.lock().await.get(label) {
            entry.controller.set_weighting_parameters(Some(params));
        }
        Ok(record)
    }

    /// Toggles votemap processing. Returns whether anything changed.
    pub async fn set_votemap_enabled(&self, label: &str, enabled: bool) -> Result<bool> {
        let mut record = self.require_server(label).await?;
        if record.weighting_parameters.is_none() {
            return Err(Error::orchestration(format!(
                "server {label} does not have any votemap settings, can't enable votemap processing"
            )));
        }
        if record.votemap_enabled == enabled {
            return Ok(false);
        }

        if let Some(entry) = self.controllers.lock().await.get(label) {
            entry.controller.set_votemap_enabled(enabled)?;
        }
        record.votemap_enabled = enabled;
        self.repo.update(record).await.map_err(|_| {
            Error::orchestration(format!("unable to save changes for server {label}"))
        })?;
        info!(server = %label, enabled, "votemap processing toggled");
        Ok(true)
    }

    async fn require_server(&self, label: &str) -> Result<ServerRecord> {
        self.repo
            .find(label)
            .await?
            .ok_or_else(|| Error::orchestration(format!("server {label} not found")))
    }
}
