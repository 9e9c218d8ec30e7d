//! Persistence of managed-server records.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::ServerRecord;
use crate::{DatastoreError, Result};

/// The store of managed servers, keyed by label. Labels and API URLs are
/// unique across records.
#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<ServerRecord>>;
    async fn find(&self, label: &str) -> Result<Option<ServerRecord>>;
    async fn insert(&self, record: ServerRecord) -> Result<()>;
    async fn update(&self, record: ServerRecord) -> Result<()>;
    async fn delete(&self, label: &str) -> Result<()>;
}

/// A document store over one JSON file.
///
/// Records load once at open; every mutation rewrites the file.
pub struct JsonFileRepository {
    path: PathBuf,
    servers: Mutex<Vec<ServerRecord>>,
}

impl JsonFileRepository {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let servers = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(DatastoreError::Json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(DatastoreError::Io(e).into()),
        };
        Ok(Self {
            path,
            servers: Mutex::new(servers),
        })
    }

    async fn persist(&self, servers: &[ServerRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(DatastoreError::Io)?;
        }
        let bytes = serde_json::to_vec_pretty(servers).map_err(DatastoreError::Json)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(DatastoreError::Io)?;
        Ok(())
    }
}

#[async_trait]
impl ServerRepository for JsonFileRepository {
    async fn list(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.servers.lock().await.clone())
    }

    async fn find(&self, label: &str) -> Result<Option<ServerRecord>> {
        Ok(self
            .servers
            .lock()
            .await
            .iter()
            .find(|record| record.label == label)
            .cloned())
    }

    async fn insert(&self, record: ServerRecord) -> Result<()> {
        record.validate()?;
        let mut servers = self.servers.lock().await;
        if servers.iter().any(|existing| existing.label == record.label) {
            return Err(DatastoreError::DuplicateLabel(record.label.clone()).into());
        }
        if servers
            .iter()
            .any(|existing| existing.connection.api_url() == record.connection.api_url())
        {
            return Err(
                DatastoreError::DuplicateUrl(record.connection.api_url().to_string()).into(),
            );
        }
        servers.push(record);
        self.persist(&servers).await
    }

    async fn update(&self, record: ServerRecord) -> Result<()> {
        record.validate()?;
        let mut servers = self.servers.lock().await;
        let position = servers
            .iter()
            .position(|existing| existing.label == record.label)
            .ok_or_else(|| DatastoreError::NotFound(record.label.clone()))?;
        let url_taken = servers.iter().enumerate().any(|(i, existing)| {
            i != position && existing.connection.api_url() == record.connection.api_url()
        });
        if url_taken {
            return Err(
                DatastoreError::DuplicateUrl(record.connection.api_url().to_string()).into(),
            );
        }
        servers[position] = record;
        self.persist(&servers).await
    }

    async fn delete(&self, label: &str) -> Result<()> {
        let mut servers = self.servers.lock().await;
        let position = servers
            .iter()
            .position(|existing| existing.label == label)
            .ok_or_else(|| DatastoreError::NotFound(label.to_string()))?;
        servers.remove(position);
        self.persist(&servers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crcon::ServerConnectionDetails;
    use pretty_assertions::assert_eq;

    fn record(label: &str, url: &str) -> ServerRecord {
        let connection = ServerConnectionDetails::new(url, "key", None).unwrap();
        ServerRecord::new(label, format!("Server {label}"), connection).unwrap()
    }

    async fn repo(dir: &tempfile::TempDir) -> JsonFileRepository {
        JsonFileRepository::open(dir.path().join("servers.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;

        repo.insert(record("alpha", "https://one.example.com"))
            .await
            .unwrap();
        let found = repo.find("alpha").await.unwrap().unwrap();
        assert_eq!(found.name, "Server alpha");
        assert!(repo.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;

        repo.insert(record("alpha", "https://one.example.com"))
            .await
            .unwrap();
        let result = repo.insert(record("alpha", "https://two.example.com")).await;
        assert!(matches!(
            result,
            Err(Error::Datastore(DatastoreError::DuplicateLabel(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_urls_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;

        repo.insert(record("alpha", "https://one.example.com"))
            .await
            .unwrap();
        let result = repo.insert(record("beta", "https://one.example.com")).await;
        assert!(matches!(
            result,
            Err(Error::Datastore(DatastoreError::DuplicateUrl(_)))
        ));
    }

    #[tokio::test]
    async fn update_replaces_the_matching_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;

        repo.insert(record("alpha", "https://one.example.com"))
            .await
            .unwrap();
        let mut changed = record("alpha", "https://one.example.com");
        changed.votemap_enabled = true;
        repo.update(changed).await.unwrap();

        assert!(repo.find("alpha").await.unwrap().unwrap().votemap_enabled);

        let missing = repo.update(record("ghost", "https://ghost.example.com")).await;
        assert!(matches!(
            missing,
            Err(Error::Datastore(DatastoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;

        repo.insert(record("alpha", "https://one.example.com"))
            .await
            .unwrap();
        repo.delete("alpha").await.unwrap();
        assert!(repo.find("alpha").await.unwrap().is_none());
        assert!(repo.delete("alpha").await.is_err());
    }

    #[tokio::test]
    async fn records_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = repo(&dir).await;
            repo.insert(record("alpha", "https://one.example.com"))
                .await
                .unwrap();
        }
        let reopened = repo(&dir).await;
        let servers = reopened.list().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].label, "alpha");
    }
}
