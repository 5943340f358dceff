//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'integrazione con altri processi
//! (editor, CI, wrapper).
//!
//! ## Responsabilità:
//! - Emette un evento JSON per riga (NDJSON) su stdout
//! - Descrive il ciclo di vita di composizioni e stage
//! - I log restano su stderr, stdout contiene solo eventi
//!
//! ## Tipi di messaggi:
//! - `composition_start`: Inizio di una composizione (`default`, `build`, stage singolo)
//! - `stage_start`: Uno stage viene avviato
//! - `stage_complete`: Uno stage è terminato con successo
//! - `stage_failed`: Uno stage è fallito
//! - `composition_complete`: Fine della composizione, con esito

use crate::pipeline::{StageId, StageReport};
use serde::{Deserialize, Serialize};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio di una composizione
    #[serde(rename = "composition_start")]
    CompositionStart { composition: String, stages: Vec<String> },

    /// Avvio di uno stage
    #[serde(rename = "stage_start")]
    StageStart { stage: String },

    /// Stage completato
    #[serde(rename = "stage_complete")]
    StageComplete {
        stage: String,
        files: usize,
        detail: String,
        duration_ms: u64,
    },

    /// Stage fallito
    #[serde(rename = "stage_failed")]
    StageFailed { stage: String, error: String },

    /// Composizione terminata
    #[serde(rename = "composition_complete")]
    CompositionComplete {
        composition: String,
        success: bool,
        stages_completed: usize,
        duration_seconds: f64,
        error: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn composition_start(composition: &str, stages: &[StageId]) -> Self {
        Self::CompositionStart {
            composition: composition.to_string(),
            stages: stages.iter().map(|s| s.name().to_string()).collect(),
        }
    }

    pub fn stage_start(stage: StageId) -> Self {
        Self::StageStart {
            stage: stage.name().to_string(),
        }
    }

    pub fn stage_complete(report: &StageReport) -> Self {
        Self::StageComplete {
            stage: report.stage.name().to_string(),
            files: report.files,
            detail: report.detail.clone(),
            duration_ms: report.duration.as_millis() as u64,
        }
    }

    pub fn stage_failed(stage: StageId, error: &anyhow::Error) -> Self {
        Self::StageFailed {
            stage: stage.name().to_string(),
            error: format!("{:#}", error),
        }
    }

    pub fn composition_complete(
        composition: &str,
        stages_completed: usize,
        duration_seconds: f64,
        error: Option<&anyhow::Error>,
    ) -> Self {
        Self::CompositionComplete {
            composition: composition.to_string(),
            success: error.is_none(),
            stages_completed,
            duration_seconds,
            error: error.map(|e| format!("{:#}", e)),
        }
    }
}
