//! # State Management Module
//!
//! Questo modulo gestisce il watermark incrementale degli stage (oggi: la conversione WebP).
//!
//! ## Responsabilità:
//! - Traccia per ogni stage l'ultima esecuzione riuscita (`last_success`)
//! - Traccia quali file sono già stati elaborati da uno stage e con quale contenuto
//! - Persiste lo stato in un file JSON per progetto
//! - Cleanup automatico di entry per file che non esistono più
//! - Reset esplicito di uno stage (usato da `webpDel`)
//!
//! ## Strutture dati:
//! - `ProcessedFile`: Fingerprint di un file elaborato (path, mtime, size, sha256)
//! - `StageState`: Watermark di uno stage (timestamp + fingerprint)
//! - `StateFile`: Container di tutti gli stage di un progetto
//! - `StateManager`: Gestisce operazioni di lettura/scrittura stato
//!
//! ## Strategia di persistence:
//! - Un file JSON per root di progetto (basato su hash del path)
//! - Salvataggio in `~/.asset-pipeline/state_<hash>.json` (o `state_dir` da config)
//!
//! ## Prevenzione rielaborazione:
//! - Un file è "nuovo" se non compare nel fingerprint set dello stage
//!   oppure se il suo contenuto (sha256) è cambiato
//! - Fast path: stesso mtime e stessa size ⇒ nessun hashing
//! - Il watermark sopravvive a riavvii ed invocazioni manuali: un file copiato con
//!   un mtime vecchio viene comunque riconosciuto come nuovo
//!
//! ## Esempio struttura state file:
//! ```json
//! {
//!   "stages": {
//!     "webp": {
//!       "last_success": 1700000000,
//!       "processed_files": {
//!         "/project/app/images/hero.jpg": {
//!           "path": "/project/app/images/hero.jpg",
//!           "modified_time": 1699999000,
//!           "size": 48211,
//!           "content_hash": "9f86d0…",
//!           "processed_at": 1700000000
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// Fingerprint of a file processed by a stage
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub modified_time: u64,
    pub size: u64,
    pub content_hash: String,
    pub processed_at: u64,
}

impl ProcessedFile {
    /// Fingerprint a file as it is on disk right now
    pub async fn fingerprint(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).await?;
        let modified_time = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        let content = fs::read(path).await?;

        Ok(Self {
            path: path.to_path_buf(),
            modified_time,
            size: metadata.len(),
            content_hash: hex::encode(Sha256::digest(&content)),
            processed_at: now_secs(),
        })
    }
}

/// Watermark of a single stage
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct StageState {
    pub last_success: Option<u64>,
    pub processed_files: HashMap<String, ProcessedFile>,
}

/// State file tracking every incremental stage of a project
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct StateFile {
    pub stages: HashMap<String, StageState>,
}

/// Manages the persisted incremental state
pub struct StateManager {
    state_file_path: PathBuf,
    state: StateFile,
}

impl StateManager {
    /// Create a state manager for a project root.
    /// `state_dir` overrides the default `~/.asset-pipeline`.
    pub async fn new(project_root: &Path, state_dir: Option<&Path>) -> Result<Self> {
        let state_dir = match state_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
                .join(".asset-pipeline"),
        };

        fs::create_dir_all(&state_dir).await?;

        // Create unique state file based on project root hash
        let mut hasher = Sha256::new();
        hasher.update(project_root.to_string_lossy().as_bytes());
        let hash = hex::encode(hasher.finalize())[..16].to_string();

        Self::at(state_dir.join(format!("state_{}.json", hash))).await
    }

    /// Open (or start) a state file at an explicit path
    pub async fn at(state_file_path: PathBuf) -> Result<Self> {
        let state = if state_file_path.exists() {
            let content = fs::read_to_string(&state_file_path).await?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable state file {}: {}", state_file_path.display(), e);
                StateFile::default()
            })
        } else {
            StateFile::default()
        };

        Ok(Self {
            state_file_path,
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.state_file_path
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.state_file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.state_file_path, content).await?;
        Ok(())
    }

    /// Whether `path` is new (or changed) since the stage last processed it
    pub async fn needs_processing(&self, stage: &str, path: &Path) -> Result<bool> {
        let key = path.to_string_lossy().to_string();
        let Some(recorded) = self
            .state
            .stages
            .get(stage)
            .and_then(|s| s.processed_files.get(&key))
        else {
            return Ok(true);
        };

        let metadata = fs::metadata(path).await?;
        let modified_time = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        if recorded.modified_time == modified_time && recorded.size == metadata.len() {
            return Ok(false);
        }

        let current = ProcessedFile::fingerprint(path).await?;
        debug!(
            "{} changed on disk, comparing content hash ({} vs {})",
            path.display(),
            recorded.content_hash,
            current.content_hash
        );
        Ok(current.content_hash != recorded.content_hash)
    }

    /// Mark a file as processed by a stage
    pub fn mark_processed(&mut self, stage: &str, processed_file: ProcessedFile) {
        self.state
            .stages
            .entry(stage.to_string())
            .or_default()
            .processed_files
            .insert(processed_file.path.to_string_lossy().to_string(), processed_file);
    }

    /// Advance the stage watermark to now
    pub fn record_success(&mut self, stage: &str) {
        self.state.stages.entry(stage.to_string()).or_default().last_success = Some(now_secs());
    }

    /// Number of files a stage has processed
    pub fn processed_count(&self, stage: &str) -> usize {
        self.state
            .stages
            .get(stage)
            .map(|s| s.processed_files.len())
            .unwrap_or(0)
    }

    /// Forget everything a stage has processed
    pub fn reset_stage(&mut self, stage: &str) {
        self.state.stages.remove(stage);
    }

    /// Clean up old entries (files that no longer exist)
    pub async fn cleanup(&mut self) -> Result<()> {
        let mut removed_count = 0;

        for stage in self.state.stages.values_mut() {
            let before = stage.processed_files.len();
            stage.processed_files.retain(|_, f| f.path.exists());
            removed_count += before - stage.processed_files.len();
        }

        if removed_count > 0 {
            debug!("Removed {} stale state entries", removed_count);
            self.save().await?;
        }

        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
