//! Worker directory: the external source of roles and placements.
//!
//! The engine only reads from it. Production deployments implement
//! [`WorkerDirectory`] over their HR store; [`InMemoryDirectory`] serves
//! tests and the CLI, optionally loaded from a TOML file.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::RwLock;

use crate::engine::hierarchy::resolve_level;
use crate::error::{Error, Result};
use crate::model::{DirectorateId, HierarchyLevel, WorkerId, WorkerRecord};

#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    /// Fetch an active worker. Unknown and inactive workers are `NotFound`.
    async fn get_worker(&self, id: WorkerId) -> Result<WorkerRecord>;

    /// An active worker whose role resolves to `level`, optionally within a
    /// directorate.
    async fn find_worker_at_level(
        &self,
        level: HierarchyLevel,
        directorate: Option<DirectorateId>,
    ) -> Result<Option<WorkerId>>;

    /// Active workers placed in a directorate.
    async fn directorate_members(&self, directorate: DirectorateId) -> Result<Vec<WorkerId>>;
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    worker: Vec<WorkerRecord>,
}

/// Directory held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    workers: RwLock<Vec<WorkerRecord>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: impl IntoIterator<Item = WorkerRecord>) -> Self {
        let dir = Self::new();
        for worker in workers {
            dir.upsert(worker);
        }
        dir
    }

    /// Parse `[[worker]]` tables.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: DirectoryFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad directory file: {e}")))?;
        Ok(Self::with_workers(file.worker))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read directory file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Insert a worker, or replace the one with the same id.
    pub fn upsert(&self, worker: WorkerRecord) {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        match workers.iter_mut().find(|w| w.id == worker.id) {
            Some(existing) => *existing = worker,
            None => workers.push(worker),
        }
    }

    pub fn set_active(&self, id: WorkerId, active: bool) {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(worker) = workers.iter_mut().find(|w| w.id == id) {
            worker.is_active = active;
        }
    }

    pub fn len(&self) -> usize {
        self.workers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkerDirectory for InMemoryDirectory {
    async fn get_worker(&self, id: WorkerId) -> Result<WorkerRecord> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers
            .iter()
            .find(|w| w.id == id && w.is_active)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("worker {id}")))
    }

    async fn find_worker_at_level(
        &self,
        level: HierarchyLevel,
        directorate: Option<DirectorateId>,
    ) -> Result<Option<WorkerId>> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        Ok(workers
            .iter()
            .filter(|w| w.is_active)
            .filter(|w| directorate.is_none() || w.directorate == directorate)
            .find(|w| resolve_level(&w.role) == level)
            .map(|w| w.id))
    }

    async fn directorate_members(&self, directorate: DirectorateId) -> Result<Vec<WorkerId>> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        Ok(workers
            .iter()
            .filter(|w| w.is_active && w.directorate == Some(directorate))
            .map(|w| w.id)
            .collect())
    }
}
