//! # Pipeline (composition root)
//!
//! Possiede tutto lo stato condiviso di un'invocazione e implementa `StageRunner`
//! collegando ogni `StageId` al modulo che lo realizza.
//!
//! ## Stato posseduto:
//! - `Config` (layout, qualità, server, watch)
//! - `ReloadSession` passata esplicitamente a styles, scripts, dev server e watcher
//! - `PlatformCommands` per i tool esterni
//! - `StateManager` dietro un `tokio::sync::Mutex` (watermark dello stage webp),
//!   aperto solo al primo stage che lo usa (`webp`, `webpDel`)
//! - `Reporter` per log ed eventi JSON
//!
//! ## Flusso:
//! 1. `Pipeline::new` valida la configurazione e canonicalizza la root
//! 2. `run(&graph)` esegue una composizione sul task graph
//! 3. Ogni nodo chiama `run_stage`, anche ricorsivamente dal watcher

use crate::config::Config;
use crate::dist;
use crate::image_processor::{self, ImageProcessor, WEBP_STAGE};
use crate::pipeline::graph::{run_composition, TaskGraph};
use crate::pipeline::progress_tracker::Reporter;
use crate::pipeline::stage::{StageId, StageReport, StageRunner};
use crate::platform::PlatformCommands;
use crate::server::DevServer;
use crate::session::ReloadSession;
use crate::sprite;
use crate::state::StateManager;
use crate::watcher::Watcher;
use crate::{css_processor, html_processor, script_processor};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

pub struct Pipeline {
    root: PathBuf,
    config: Config,
    session: ReloadSession,
    platform: PlatformCommands,
    state: OnceCell<Mutex<StateManager>>,
    reporter: Reporter,
}

impl Pipeline {
    pub async fn new(project_root: &Path, config: Config, session: ReloadSession) -> Result<Self> {
        config.validate()?;
        let root = project_root
            .canonicalize()
            .with_context(|| format!("Project root does not exist: {}", project_root.display()))?;

        Ok(Self {
            platform: PlatformCommands::for_project(&root),
            reporter: Reporter::new(config.json_output),
            root,
            config,
            session,
            state: OnceCell::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &ReloadSession {
        &self.session
    }

    pub fn platform(&self) -> &PlatformCommands {
        &self.platform
    }

    /// Run a composition to completion
    pub async fn run(&self, graph: &TaskGraph) -> Result<Vec<StageReport>> {
        run_composition(graph, self, &self.reporter).await
    }

    /// Incremental state, opened and pruned on first use
    async fn state(&self) -> Result<&Mutex<StateManager>> {
        self.state
            .get_or_try_init(|| async {
                let mut state = StateManager::new(&self.root, self.config.state_dir.as_deref()).await?;
                state.cleanup().await?;
                debug!("State file: {}", state.path().display());
                Ok::<_, anyhow::Error>(Mutex::new(state))
            })
            .await
    }

    fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    fn images(&self) -> ImageProcessor<'_> {
        ImageProcessor::new(&self.config, &self.platform, !self.reporter.json_output())
    }

    async fn dispatch(&self, stage: StageId) -> Result<StageReport> {
        let layout = &self.config.layout;

        let report = match stage {
            StageId::Styles => {
                let output = css_processor::compile_stylesheet(
                    &self.path(&layout.scss_entry),
                    &self.path(&layout.css_dir),
                    &layout.css_name,
                    &self.config.browserslist,
                )
                .await?;
                self.session.inject(self.served_path(&output));
                StageReport::new(stage, 1, format!("compiled {}", layout.css_output().display()))
            }
            StageId::Scripts => {
                let entries: Vec<PathBuf> = layout.js_entries.iter().map(|e| self.path(e)).collect();
                script_processor::bundle(&entries, &self.path(&layout.js_bundle())).await?;
                self.session.reload();
                StageReport::new(stage, 1, format!("bundled {} entry file(s)", entries.len()))
            }
            StageId::HtmlMin => {
                let pages =
                    html_processor::minify_tree(&self.path(&layout.source_dir), &self.path(&layout.dist_dir)).await?;
                StageReport::new(stage, pages.len(), format!("{} page(s)", pages.len()))
            }
            StageId::CssMin => {
                let sheets = css_processor::minify_tree(
                    &self.path(&layout.css_dir),
                    &self.path(&layout.dist_for(&layout.css_dir)),
                    &self.config.browserslist,
                )
                .await?;
                StageReport::new(stage, sheets.len(), format!("{} stylesheet(s)", sheets.len()))
            }
            StageId::JsMin => {
                let bundle = layout.js_bundle();
                script_processor::minify(&self.platform, &self.path(&bundle), &self.path(&layout.dist_for(&bundle)))
                    .await?;
                StageReport::new(stage, 1, format!("minified {}", bundle.display()))
            }
            StageId::ImagesMin => {
                let stats = self
                    .images()
                    .optimize_tree(&self.path(&layout.images_dir), &self.path(&layout.dist_for(&layout.images_dir)))
                    .await?;
                StageReport::new(stage, stats.files_processed, stats.format_summary())
            }
            StageId::Webp => {
                let mut state = self.state().await?.lock().await;
                let converted = self
                    .images()
                    .convert_new_to_webp(&self.path(&layout.images_dir), &self.path(&layout.favicon_dir), &mut state)
                    .await?;
                let tracked = state.processed_count(WEBP_STAGE);
                StageReport::new(
                    stage,
                    converted,
                    format!("{} new image(s) converted, {} tracked", converted, tracked),
                )
            }
            StageId::WebpDel => {
                let deleted = image_processor::delete_webp(&self.path(&layout.images_dir)).await?;
                let mut state = self.state().await?.lock().await;
                state.reset_stage(WEBP_STAGE);
                state.save().await?;
                StageReport::new(stage, deleted, format!("{} WebP file(s) deleted", deleted))
            }
            StageId::Sprite => {
                let output = sprite::build_sprite(
                    &self.path(&layout.sprite_dir),
                    &self.path(&layout.images_dir),
                    &layout.sprite_name,
                )
                .await?;
                StageReport::new(stage, 1, format!("wrote {}", self.relative(&output).display()))
            }
            StageId::BuildOther => {
                let copied = dist::copy_static(
                    &self.path(&layout.source_dir),
                    &self.path(&layout.fonts_dir),
                    &layout.manifest_name,
                    &self.path(&layout.dist_dir),
                )
                .await?;
                StageReport::new(stage, copied.len(), format!("{} static file(s)", copied.len()))
            }
            StageId::CleanDist => {
                let removed = dist::clean_dist(&self.path(&layout.dist_dir)).await?;
                let detail = if removed { "removed" } else { "nothing to remove" };
                StageReport::new(stage, 0, format!("{} {}", layout.dist_dir.display(), detail))
            }
            StageId::ZipArchive => {
                let output = dist::archive(&self.path(&layout.dist_dir), &layout.archive_name).await?;
                StageReport::new(stage, 1, format!("wrote {}", self.relative(&output).display()))
            }
            StageId::Browsersync => {
                let server = DevServer::new(
                    self.path(&layout.source_dir),
                    self.session.clone(),
                    &self.config.server.host,
                    self.config.server.port,
                );
                server.run().await?;
                StageReport::new(stage, 0, "server stopped")
            }
            StageId::Watching => {
                let watcher = Watcher::new(&self.root, layout, self.config.watch.debounce_ms)?;
                watcher.run(self, &self.session, &self.reporter).await?;
                StageReport::new(stage, 0, "watcher stopped")
            }
        };

        Ok(report)
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// URL path of a staged file as the dev server serves it (`/css/index.css`)
    fn served_path(&self, staged: &Path) -> String {
        let document_root = self.path(&self.config.layout.source_dir);
        match staged.strip_prefix(&document_root) {
            Ok(rel) => format!("/{}", crate::file_manager::to_slash(rel)),
            Err(_) => staged.display().to_string(),
        }
    }
}

impl StageRunner for Pipeline {
    fn run_stage(&self, stage: StageId) -> BoxFuture<'_, Result<StageReport>> {
        Box::pin(self.dispatch(stage))
    }
}
