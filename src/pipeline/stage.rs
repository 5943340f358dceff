//! Stage identifiers, reports and the `StageRunner` seam the executor drives.

use anyhow::Result;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Every named pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StageId {
    Styles,
    Scripts,
    HtmlMin,
    CssMin,
    JsMin,
    ImagesMin,
    Webp,
    WebpDel,
    Sprite,
    BuildOther,
    CleanDist,
    ZipArchive,
    Browsersync,
    Watching,
}

impl StageId {
    pub const ALL: [StageId; 14] = [
        StageId::Styles,
        StageId::Scripts,
        StageId::HtmlMin,
        StageId::CssMin,
        StageId::JsMin,
        StageId::ImagesMin,
        StageId::Webp,
        StageId::WebpDel,
        StageId::Sprite,
        StageId::BuildOther,
        StageId::CleanDist,
        StageId::ZipArchive,
        StageId::Browsersync,
        StageId::Watching,
    ];

    /// Task name as exposed on the command line
    pub fn name(self) -> &'static str {
        match self {
            StageId::Styles => "styles",
            StageId::Scripts => "scripts",
            StageId::HtmlMin => "htmlMin",
            StageId::CssMin => "cssMin",
            StageId::JsMin => "jsMin",
            StageId::ImagesMin => "imagesMin",
            StageId::Webp => "webp",
            StageId::WebpDel => "webpDel",
            StageId::Sprite => "sprite",
            StageId::BuildOther => "buildOther",
            StageId::CleanDist => "cleanDist",
            StageId::ZipArchive => "zipArchive",
            StageId::Browsersync => "browsersync",
            StageId::Watching => "watching",
        }
    }

    /// Stages that never complete on their own
    pub fn is_long_running(self) -> bool {
        matches!(self, StageId::Browsersync | StageId::Watching)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageId::ALL
            .iter()
            .copied()
            .find(|stage| stage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown task '{}'", s))
    }
}

/// Outcome of a successful stage run
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: StageId,
    /// Number of files written, converted or deleted
    pub files: usize,
    pub detail: String,
    pub duration: Duration,
}

impl StageReport {
    pub fn new(stage: StageId, files: usize, detail: impl Into<String>) -> Self {
        Self {
            stage,
            files,
            detail: detail.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Runs a single stage. Implemented by the composition root and by test doubles.
pub trait StageRunner: Send + Sync {
    fn run_stage(&self, stage: StageId) -> BoxFuture<'_, Result<StageReport>>;
}
