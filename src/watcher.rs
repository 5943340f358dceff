//! # Watch Mode
//!
//! Osserva l'albero sorgente e rilancia gli stage associati ai file modificati.
//!
//! ## Regole (relative alla root del progetto):
//! | Pattern                                   | Eventi              | Azione          |
//! |-------------------------------------------|---------------------|-----------------|
//! | `app/scss/**/*.scss`                      | add, change, remove | stage `styles`  |
//! | `app/js/**/*.js` (escluso `index.min.js`) | add, change, remove | stage `scripts` |
//! | `app/images/**/*.{jpg,jpeg,png}`          | add                 | stage `webp`    |
//! | `app/**/*.html`                           | add, change         | reload          |
//!
//! Gli editor che salvano in modo atomico (file temporaneo + rename) producono
//! `Create`/rename-to sul file esistente: per l'HTML vale come modifica.
//!
//! ## Debounce:
//! Gli eventi `notify` arrivano su un canale tokio; dopo il primo evento si attende
//! `debounce_ms` raccogliendo il resto del burst, poi ogni azione distinta viene
//! eseguita una sola volta, nell'ordine della prima occorrenza.
//!
//! Un errore di uno stage viene loggato e il watcher continua.

use crate::config::Layout;
use crate::error::PipelineError;
use crate::file_manager::{to_slash, SourceSet};
use crate::pipeline::{Reporter, StageId, StageRunner};
use crate::session::ReloadSession;
use anyhow::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Filesystem change, as seen by watch rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
}

/// What a matching change triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchAction {
    Run(StageId),
    Reload,
}

const ANY_CHANGE: &[ChangeKind] = &[ChangeKind::Add, ChangeKind::Change, ChangeKind::Remove];

struct WatchRule {
    sources: SourceSet,
    kinds: &'static [ChangeKind],
    action: WatchAction,
}

/// Immutable pattern → action table
pub struct WatchRuleSet {
    root: PathBuf,
    rules: Vec<WatchRule>,
}

impl WatchRuleSet {
    pub fn from_layout(root: &Path, layout: &Layout) -> Result<Self> {
        let rel = |path: &Path| to_slash(path);

        let styles = SourceSet::new(root).include(&format!("{}/**/*.scss", rel(&layout.scss_dir)))?;
        let scripts = SourceSet::new(root)
            .include(&format!("{}/**/*.js", rel(&layout.js_dir)))?
            .exclude(&rel(&layout.js_bundle()))?;
        let images = ["jpg", "jpeg", "png"]
            .iter()
            .try_fold(SourceSet::new(root), |set, ext| {
                set.include(&format!("{}/**/*.{}", rel(&layout.images_dir), ext))
            })?;
        let pages = SourceSet::new(root).include(&format!("{}/**/*.html", rel(&layout.source_dir)))?;

        Ok(Self {
            root: root.to_path_buf(),
            rules: vec![
                WatchRule {
                    sources: styles,
                    kinds: ANY_CHANGE,
                    action: WatchAction::Run(StageId::Styles),
                },
                WatchRule {
                    sources: scripts,
                    kinds: ANY_CHANGE,
                    action: WatchAction::Run(StageId::Scripts),
                },
                WatchRule {
                    sources: images,
                    kinds: &[ChangeKind::Add],
                    action: WatchAction::Run(StageId::Webp),
                },
                WatchRule {
                    sources: pages,
                    kinds: &[ChangeKind::Add, ChangeKind::Change],
                    action: WatchAction::Reload,
                },
            ],
        })
    }

    /// Actions triggered by `kind` on `path` (absolute or relative to the root)
    pub fn actions_for(&self, path: &Path, kind: ChangeKind) -> Vec<WatchAction> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.rules
            .iter()
            .filter(|rule| rule.kinds.contains(&kind) && rule.sources.matches(relative))
            .map(|rule| rule.action)
            .collect()
    }
}

/// Translate a `notify` event into per-path changes. Metadata and access events are ignored.
pub fn changes(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Add,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Add,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut renamed = Vec::new();
            if let Some(from) = event.paths.first() {
                renamed.push((from.clone(), ChangeKind::Remove));
            }
            if let Some(to) = event.paths.get(1) {
                renamed.push((to.clone(), ChangeKind::Add));
            }
            return renamed;
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Change,
        EventKind::Remove(_) => ChangeKind::Remove,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };
    event.paths.iter().map(|path| (path.clone(), kind)).collect()
}

/// Long-lived watch loop over the source tree
pub struct Watcher {
    root: PathBuf,
    watch_dir: PathBuf,
    rules: WatchRuleSet,
    debounce: Duration,
}

impl Watcher {
    pub fn new(project_root: &Path, layout: &Layout, debounce_ms: u64) -> Result<Self> {
        // notify reports canonical paths
        let root = project_root
            .canonicalize()
            .unwrap_or_else(|_| project_root.to_path_buf());
        let watch_dir = root.join(&layout.source_dir);
        if !watch_dir.is_dir() {
            return Err(PipelineError::NoMatchingFiles(watch_dir.display().to_string()).into());
        }

        Ok(Self {
            rules: WatchRuleSet::from_layout(&root, layout)?,
            root,
            watch_dir,
            debounce: Duration::from_millis(debounce_ms),
        })
    }

    /// Watch until the event channel closes. Stage failures are logged, not returned.
    pub async fn run(&self, runner: &dyn StageRunner, session: &ReloadSession, reporter: &Reporter) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(PipelineError::from)?;
        watcher
            .watch(&self.watch_dir, RecursiveMode::Recursive)
            .map_err(PipelineError::from)?;

        info!("👀 Watching {} for changes", self.watch_dir.display());

        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            let deadline = tokio::time::sleep(self.debounce);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    next = rx.recv() => match next {
                        Some(event) => batch.push(event),
                        None => break,
                    },
                }
            }

            for action in self.actions_for_batch(batch) {
                match action {
                    WatchAction::Reload => {
                        info!("Reloading connected browsers");
                        session.reload();
                    }
                    WatchAction::Run(stage) => {
                        reporter.stage_start(stage);
                        let started = Instant::now();
                        match runner.run_stage(stage).await {
                            Ok(report) => reporter.stage_complete(&report.with_duration(started.elapsed())),
                            Err(e) => reporter.stage_failed(stage, &e),
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Distinct actions for a burst of events, in order of first occurrence
    pub fn actions_for_batch(&self, batch: Vec<notify::Result<Event>>) -> Vec<WatchAction> {
        let mut actions = Vec::new();
        for result in batch {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("Watch error: {}", e);
                    continue;
                }
            };
            for (path, kind) in changes(&event) {
                let matched = self.rules.actions_for(&path, kind);
                if !matched.is_empty() {
                    debug!("{:?} {} -> {:?}", kind, path.display(), matched);
                }
                for action in matched {
                    if !actions.contains(&action) {
                        actions.push(action);
                    }
                }
            }
        }
        actions
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
