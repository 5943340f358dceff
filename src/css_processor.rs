//! # Stylesheet Processing Module
//!
//! Questo modulo gestisce la compilazione e la minificazione dei fogli di stile.
//!
//! ## Responsabilità:
//! - `compile_stylesheet`: SCSS → CSS (`grass`), vendor prefixing secondo la query
//!   browserslist (`lightningcss`), scrittura nella directory di staging
//! - `minify_tree`: minificazione aggressiva dei CSS di staging verso `dist/css`
//!
//! ## Pipeline di compilazione:
//! 1. Verifica esistenza entry (`app/scss/index.scss`)
//! 2. Compilazione SCSS sul blocking pool
//! 3. Prefixing per i target derivati da browserslist (nessuna minificazione)
//! 4. Scrittura in `app/css/index.css` (sovrascrive l'output precedente)
//!
//! Un errore di sintassi interrompe lo stage prima di qualsiasi scrittura.
//!
//! ## Minificazione:
//! - Merge di regole e dichiarazioni duplicate, shorthand, rimozione whitespace
//! - L'output non è mai più grande dell'input

use crate::error::PipelineError;
use crate::file_manager::{FileManager, SourceSet};
use anyhow::Result;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve browserslist queries into lightningcss targets
pub fn resolve_targets(queries: &[String]) -> Result<Targets> {
    let browsers = Browsers::from_browserslist(queries.iter())
        .map_err(|e| PipelineError::transform("browserslist", e))?;
    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

/// Add vendor prefixes (and lower modern syntax) for the given targets, keeping the output readable
pub fn autoprefix(css: &str, filename: &str, targets: Targets) -> Result<String> {
    transform(css, filename, targets, false)
}

/// Minify a stylesheet: merges duplicate rules, collapses declarations, strips whitespace
pub fn minify(css: &str, filename: &str, targets: Targets) -> Result<String> {
    transform(css, filename, targets, true)
}

fn transform(css: &str, filename: &str, targets: Targets, minify: bool) -> Result<String> {
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| PipelineError::transform("css", e))?;

    if minify {
        sheet
            .minify(MinifyOptions {
                targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| PipelineError::transform("css", e))?;
    }

    let result = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| PipelineError::transform("css", e))?;

    Ok(result.code)
}

/// Compile the SCSS entry into `<out_dir>/<out_name>`. Nothing is written on failure.
pub async fn compile_stylesheet(
    entry: &Path,
    out_dir: &Path,
    out_name: &str,
    browserslist: &[String],
) -> Result<PathBuf> {
    if !entry.is_file() {
        return Err(PipelineError::NoMatchingFiles(entry.display().to_string()).into());
    }

    let entry_owned = entry.to_path_buf();
    let queries = browserslist.to_vec();
    let filename = out_name.to_string();

    let css = tokio::task::spawn_blocking(move || -> Result<String> {
        let options = grass::Options::default().style(grass::OutputStyle::Expanded);
        let compiled = grass::from_path(&entry_owned, &options)
            .map_err(|e| PipelineError::transform("scss", e))?;
        let targets = resolve_targets(&queries)?;
        autoprefix(&compiled, &filename, targets)
    })
    .await??;

    let output = out_dir.join(out_name);
    FileManager::write(&output, css.as_bytes()).await?;
    info!("Compiled {} -> {}", entry.display(), output.display());
    Ok(output)
}

/// Minify every `*.css` under `css_dir` into `dest_dir`, preserving relative paths
pub async fn minify_tree(css_dir: &Path, dest_dir: &Path, browserslist: &[String]) -> Result<Vec<PathBuf>> {
    let files = SourceSet::new(css_dir).include("**/*.css")?.resolve_nonempty()?;
    let targets = resolve_targets(browserslist)?;
    let mut outputs = Vec::with_capacity(files.len());

    for file in files {
        let source = tokio::fs::read_to_string(&file).await?;
        let filename = file.display().to_string();
        let minified = tokio::task::spawn_blocking(move || minify(&source, &filename, targets)).await??;

        let output = FileManager::output_path(&file, css_dir, dest_dir);
        FileManager::write(&output, minified.as_bytes()).await?;
        debug!("Minified {} -> {}", file.display(), output.display());
        outputs.push(output);
    }

    Ok(outputs)
}
