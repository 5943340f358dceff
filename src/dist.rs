//! # Distribution Tree Module
//!
//! Operazioni sull'albero di distribuzione che non trasformano contenuti.
//!
//! ## Responsabilità:
//! - `copy_static`: font e `manifest.json` copiati verbatim, path relativi preservati
//! - `clean_dist`: cancellazione ricorsiva di `dist/` (prima di ogni build)
//! - `archive`: `dist/**` compresso in `dist/archive.zip` (ultimo stage della build)

use crate::error::PipelineError;
use crate::file_manager::{to_slash, FileManager, SourceSet};
use anyhow::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;

/// Copy fonts (top level of `fonts_dir`) and every `manifest_name` under `source_dir`
/// into `dist_dir`, preserving paths relative to `source_dir`.
pub async fn copy_static(
    source_dir: &Path,
    fonts_dir: &Path,
    manifest_name: &str,
    dist_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut sources = SourceSet::new(source_dir).include(&format!("**/{}", manifest_name))?;
    if let Ok(fonts_rel) = fonts_dir.strip_prefix(source_dir) {
        sources = sources.include(&format!("{}/*", to_slash(fonts_rel)))?;
    }

    let files = sources.resolve_nonempty()?;
    let mut copied = Vec::with_capacity(files.len());
    for file in files {
        let output = FileManager::copy_preserving(&file, source_dir, dist_dir).await?;
        debug!("Copied {} -> {}", file.display(), output.display());
        copied.push(output);
    }

    info!("Copied {} static file(s)", copied.len());
    Ok(copied)
}

/// Recursively delete the distribution tree. Returns whether anything was removed.
pub async fn clean_dist(dist_dir: &Path) -> Result<bool> {
    match tokio::fs::remove_dir_all(dist_dir).await {
        Ok(()) => {
            info!("Removed {}", dist_dir.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist, nothing to clean", dist_dir.display());
            Ok(false)
        }
        Err(e) => Err(PipelineError::Io(e).into()),
    }
}

/// Zip every file under `dist_dir` into `<dist_dir>/<archive_name>`.
/// A stale archive from a previous run is never packed into the new one.
pub async fn archive(dist_dir: &Path, archive_name: &str) -> Result<PathBuf> {
    let files = SourceSet::new(dist_dir)
        .include("**/*")?
        .exclude(archive_name)?
        .resolve_nonempty()?;

    let dist = dist_dir.to_path_buf();
    let output = dist_dir.join(archive_name);
    let archive_path = output.clone();

    let entries = tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut writer = zip::ZipWriter::new(File::create(&archive_path)?);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for file in &files {
            let name = file
                .strip_prefix(&dist)
                .map(to_slash)
                .map_err(|e| anyhow::anyhow!("{} is outside {}: {}", file.display(), dist.display(), e))?;
            writer.start_file(name, options).map_err(PipelineError::from)?;
            let mut source = File::open(file)?;
            std::io::copy(&mut source, &mut writer)?;
        }

        writer.finish().map_err(PipelineError::from)?;
        Ok(files.len())
    })
    .await??;

    info!("Archived {} file(s) -> {}", entries, output.display());
    Ok(output)
}
