//! # Front Asset Pipeline Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione, layout delle directory e validazione
//! - `error`: Tipi di errore custom degli stage
//! - `state`: Watermark persistente degli stage incrementali
//! - `file_manager`: Selezione sorgenti via glob e operazioni sui file
//! - `css_processor`: SCSS → CSS, prefixing e minificazione
//! - `script_processor`: Bundling e minificazione JS
//! - `html_processor`: Minificazione HTML
//! - `image_processor`: Ottimizzazione immagini e conversione WebP incrementale
//! - `sprite`: Sprite SVG "stack"
//! - `dist`: Copia statici, pulizia e archivio della distribuzione
//! - `server`: Dev server con live reload
//! - `watcher`: Watch mode
//! - `pipeline`: Task graph, executor e composition root
//! - `progress`: Progress bar e statistiche
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use front_asset_pipeline::{Config, Pipeline, ReloadSession, TaskGraph};
//!
//! let pipeline = Pipeline::new(&root, Config::default(), ReloadSession::new()).await?;
//! pipeline.run(&TaskGraph::release()?).await?;
//! ```

pub mod config;
pub mod css_processor;
pub mod dist;
pub mod error;
pub mod file_manager;
pub mod html_processor;
pub mod image_processor;
pub mod json_output;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod script_processor;
pub mod server;
pub mod session;
pub mod sprite;
pub mod state;
pub mod tool_resolver;
pub mod watcher;

pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Pipeline, StageId, StageReport, StageRunner, TaskGraph};
pub use session::ReloadSession;
pub use state::{ProcessedFile, StateFile, StateManager};
