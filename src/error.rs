//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `PipelineError` enum per categorizzare gli errori degli stage
//! - Fornisce messaggi di errore descrittivi con il messaggio originale del tool/libreria
//! - Integra con `thiserror` per automatic error conversion
//! - Si combina con `anyhow` per la propagazione verso la composizione
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, disco pieno)
//! - `NoMatchingFiles`: Il pattern sorgente di uno stage non trova file
//! - `Transform`: Errore interno di una libreria di trasformazione (SCSS, CSS, XML)
//! - `ToolFailed`: Un tool esterno è terminato con errore
//! - `MissingDependency`: Nessun tool esterno disponibile per un formato
//! - `Archive`: Errore del writer zip
//! - `Watch`: Errore del file watcher
//! - `Server`: Errore del dev server
//! - `Validation`: Configurazione non valida
//!
//! ## Esempio:
//! ```rust,ignore
//! if files.is_empty() {
//!     return Err(PipelineError::NoMatchingFiles("app/scss/index.scss".to_string()).into());
//! }
//! ```

/// Custom error types for pipeline stages
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No files match source pattern: {0}")]
    NoMatchingFiles(String),

    #[error("{stage} failed: {message}")]
    Transform { stage: &'static str, message: String },

    #[error("{tool} failed on {input}: {message}")]
    ToolFailed {
        tool: String,
        input: String,
        message: String,
    },

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Dev server error: {0}")]
    Server(String),

    #[error("State file error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Validation(String),
}

impl PipelineError {
    pub fn transform(stage: &'static str, message: impl ToString) -> Self {
        Self::Transform {
            stage,
            message: message.to_string(),
        }
    }
}
