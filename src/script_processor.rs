//! # Script Processing Module
//!
//! Questo modulo gestisce il bundling e la minificazione degli script.
//!
//! ## Responsabilità:
//! - `bundle`: concatenazione pass-through delle entry in un unico file di staging
//!   (nessuna risoluzione di moduli)
//! - `minify`: minificazione + mangling del bundle tramite tool esterni
//!
//! ## Tool JS (priorità decrescente):
//! 1. **terser**: `--compress --mangle`
//! 2. **uglifyjs**: `-c -m`
//! 3. **Fallback**: Errore se nessun tool disponibile

use crate::error::PipelineError;
use crate::file_manager::FileManager;
use crate::platform::{to_string_vec, PlatformCommands, ToolCandidate};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Concatenate `entries` (in order) into `output`
pub async fn bundle(entries: &[PathBuf], output: &Path) -> Result<PathBuf> {
    let mut bundled = String::new();

    for entry in entries {
        if !entry.is_file() {
            return Err(PipelineError::NoMatchingFiles(entry.display().to_string()).into());
        }
        let source = tokio::fs::read_to_string(entry)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", entry.display(), e))?;
        if !bundled.is_empty() && !bundled.ends_with('\n') {
            bundled.push('\n');
        }
        bundled.push_str(&source);
    }

    FileManager::write(output, bundled.as_bytes()).await?;
    info!("Bundled {} file(s) -> {}", entries.len(), output.display());
    Ok(output.to_path_buf())
}

fn minifier_chain() -> Vec<ToolCandidate<'static>> {
    vec![
        ToolCandidate::new("terser", |input, output| {
            to_string_vec([input, "--compress", "--mangle", "--output", output])
        }),
        ToolCandidate::new("uglifyjs", |input, output| {
            to_string_vec([input, "-c", "-m", "-o", output])
        }),
    ]
}

/// Minify and mangle the staged bundle into `output`
pub async fn minify(platform: &PlatformCommands, bundle: &Path, output: &Path) -> Result<PathBuf> {
    if !bundle.is_file() {
        return Err(PipelineError::NoMatchingFiles(bundle.display().to_string()).into());
    }

    let tool = platform
        .run_tool_chain(bundle, output, &minifier_chain(), "JavaScript")
        .await?;
    info!("Minified {} with {} -> {}", bundle.display(), tool, output.display());
    Ok(output.to_path_buf())
}
