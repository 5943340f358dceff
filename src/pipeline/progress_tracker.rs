//! # Progress Tracking Module
//!
//! Punto unico per il reporting del ciclo di vita di composizioni e stage.
//! Gestisce sia gli eventi JSON (`--json`) sia i log tradizionali via `tracing`.

use crate::json_output::JsonMessage;
use crate::pipeline::stage::{StageId, StageReport};
use std::time::Duration;
use tracing::{error, info};

/// Reports composition and stage lifecycle events
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    json_output: bool,
}

impl Reporter {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    pub fn json_output(&self) -> bool {
        self.json_output
    }

    pub fn composition_start(&self, composition: &str, stages: &[StageId]) {
        if self.json_output {
            JsonMessage::composition_start(composition, stages).emit();
        }
        info!("🚀 Starting '{}' ({} stage(s))", composition, stages.len());
    }

    pub fn stage_start(&self, stage: StageId) {
        if self.json_output {
            JsonMessage::stage_start(stage).emit();
        }
        info!("Starting '{}'...", stage);
    }

    pub fn stage_complete(&self, report: &StageReport) {
        if self.json_output {
            JsonMessage::stage_complete(report).emit();
        }
        info!(
            "✅ Finished '{}' after {}: {}",
            report.stage,
            format_duration(report.duration),
            report.detail
        );
    }

    pub fn stage_failed(&self, stage: StageId, err: &anyhow::Error) {
        if self.json_output {
            JsonMessage::stage_failed(stage, err).emit();
        }
        error!("❌ '{}' failed: {:#}", stage, err);
    }

    pub fn composition_complete(
        &self,
        composition: &str,
        stages_completed: usize,
        elapsed: Duration,
        err: Option<&anyhow::Error>,
    ) {
        if self.json_output {
            JsonMessage::composition_complete(composition, stages_completed, elapsed.as_secs_f64(), err).emit();
        }
        match err {
            None => info!("🎉 '{}' completed in {}", composition, format_duration(elapsed)),
            Some(_) => error!(
                "'{}' failed after {} ({} stage(s) completed)",
                composition,
                format_duration(elapsed),
                stages_completed
            ),
        }
    }
}

/// `850 ms`, `2.41 s`
pub fn format_duration(duration: Duration) -> String {
    if duration.as_millis() < 1000 {
        format!("{} ms", duration.as_millis())
    } else {
        format!("{:.2} s", duration.as_secs_f64())
    }
}
