//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la selezione delle sorgenti.
//!
//! ## Responsabilità:
//! - Selezione ricorsiva di file tramite glob (`SourceSet`), con pattern di esclusione
//! - Errore esplicito quando un pattern sorgente non trova file
//! - Calcolo dei path di destinazione preservando la struttura relativa
//! - Rilevamento del formato immagine (magic bytes, fallback su estensione)
//! - Utilità per calcoli dimensioni e percentuali
//!
//! ## Semantica dei pattern:
//! - I pattern sono relativi alla `base` del `SourceSet` e usano sempre `/`
//! - `**/` corrisponde a zero o più directory (`**/*.html` include `index.html`)
//! - Il confronto è case-insensitive (`IMG.JPG` corrisponde a `*.jpg`)
//!
//! ## Esempio:
//! ```rust,ignore
//! let html = SourceSet::new("app").include("**/*.html")?.resolve_nonempty()?;
//! for file in html {
//!     let out = FileManager::output_path(&file, Path::new("app"), Path::new("dist"));
//! }
//! ```

use crate::error::PipelineError;
use anyhow::Result;
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Image formats the optimizer knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Gif,
    Jpeg,
    Png,
    Svg,
    Other,
}

/// A set of files below a base directory selected by glob patterns
#[derive(Debug, Clone)]
pub struct SourceSet {
    base: PathBuf,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl SourceSet {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include.push(Pattern::new(pattern).map_err(PipelineError::from)?);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude.push(Pattern::new(pattern).map_err(PipelineError::from)?);
        Ok(self)
    }

    /// Human readable description used in error messages
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .include
            .iter()
            .map(|p| format!("{}/{}", self.base.display(), p.as_str()))
            .collect();
        parts.extend(
            self.exclude
                .iter()
                .map(|p| format!("!{}/{}", self.base.display(), p.as_str())),
        );
        parts.join(", ")
    }

    /// Whether a path (relative to the base) is selected by this set
    pub fn matches(&self, relative: &Path) -> bool {
        let rel = to_slash(relative);
        self.include.iter().any(|p| p.matches_with(&rel, MATCH_OPTIONS))
            && !self.exclude.iter().any(|p| p.matches_with(&rel, MATCH_OPTIONS))
    }

    /// Walk the base directory and return every matching file, sorted.
    /// A missing base directory yields an empty list.
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.base.exists() {
            return Ok(files);
        }

        for entry in WalkDir::new(&self.base).sort_by_file_name() {
            let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read {}: {}", self.base.display(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Ok(relative) = path.strip_prefix(&self.base) {
                if self.matches(relative) {
                    files.push(path.to_path_buf());
                }
            }
        }

        Ok(files)
    }

    /// Like [`resolve`](Self::resolve) but an empty match is a stage error
    pub fn resolve_nonempty(&self) -> Result<Vec<PathBuf>> {
        let files = self.resolve()?;
        if files.is_empty() {
            return Err(PipelineError::NoMatchingFiles(self.describe()).into());
        }
        Ok(files)
    }
}

/// Forward-slash form of a relative path, as glob patterns expect
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Manages file operations
pub struct FileManager;

impl FileManager {
    /// Get information about a file (size and modification time)
    pub async fn get_file_info(path: &Path) -> Result<(u64, u64)> {
        let metadata = fs::metadata(path).await?;
        let size = metadata.len();
        let modified = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        Ok((size, modified))
    }

    /// Destination of `input` when mirroring `base` into `dest_root`
    pub fn output_path(input: &Path, base: &Path, dest_root: &Path) -> PathBuf {
        match input.strip_prefix(base) {
            Ok(relative) => dest_root.join(relative),
            Err(_) => dest_root.join(input.file_name().unwrap_or_default()),
        }
    }

    /// Write `contents` to `path`, creating parent directories
    pub async fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, contents)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Copy a file verbatim, preserving its path relative to `base` under `dest_root`
    pub async fn copy_preserving(input: &Path, base: &Path, dest_root: &Path) -> Result<PathBuf> {
        let output = Self::output_path(input, base, dest_root);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(input, &output)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to copy {} to {}: {}", input.display(), output.display(), e))?;
        Ok(output)
    }

    /// Detect the image format, sniffing magic bytes first and falling back to the extension
    pub fn detect_image_kind(path: &Path) -> ImageKind {
        let sniffed = image::io::Reader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .ok()
            .and_then(|reader| reader.format());

        match sniffed {
            Some(image::ImageFormat::Gif) => return ImageKind::Gif,
            Some(image::ImageFormat::Jpeg) => return ImageKind::Jpeg,
            Some(image::ImageFormat::Png) => return ImageKind::Png,
            Some(_) => return ImageKind::Other,
            None => {}
        }

        match Self::extension(path).as_deref() {
            Some("gif") => ImageKind::Gif,
            Some("jpg") | Some("jpeg") => ImageKind::Jpeg,
            Some("png") => ImageKind::Png,
            Some("svg") => ImageKind::Svg,
            _ => ImageKind::Other,
        }
    }

    /// Lower-cased file extension
    pub fn extension(path: &Path) -> Option<String> {
        path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_source_set_include_exclude() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "js/index.js");
        touch(temp.path(), "js/index.min.js");
        touch(temp.path(), "js/lib/util.js");
        touch(temp.path(), "css/index.css");

        let set = SourceSet::new(temp.path())
            .include("js/**/*.js")
            .unwrap()
            .exclude("js/index.min.js")
            .unwrap();
        let files = set.resolve().unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.contains(&temp.path().join("js/index.js")));
        assert!(files.contains(&temp.path().join("js/lib/util.js")));
    }

    #[test]
    fn test_double_star_matches_top_level() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "index.html");
        touch(temp.path(), "pages/about.html");

        let files = SourceSet::new(temp.path()).include("**/*.html").unwrap().resolve().unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_single_star_stays_in_directory() {
        let set = SourceSet::new("app").include("fonts/*").unwrap();
        assert!(set.matches(Path::new("fonts/inter.woff2")));
        assert!(!set.matches(Path::new("fonts/legacy/inter.ttf")));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let set = SourceSet::new("app").include("**/*.jpg").unwrap();
        assert!(set.matches(Path::new("photos/IMG_001.JPG")));
        assert!(!set.matches(Path::new("photos/IMG_001.png")));
    }

    #[test]
    fn test_resolve_nonempty_errors_on_empty_match() {
        let temp = TempDir::new().unwrap();
        let err = SourceSet::new(temp.path())
            .include("*.svg")
            .unwrap()
            .resolve_nonempty()
            .unwrap_err();
        assert!(err.to_string().contains("No files match"));
    }

    #[test]
    fn test_missing_base_is_empty() {
        let set = SourceSet::new("/definitely/not/here").include("*").unwrap();
        assert!(set.resolve().unwrap().is_empty());
    }

    #[test]
    fn test_output_path() {
        let out = FileManager::output_path(
            Path::new("app/images/icons/a.png"),
            Path::new("app/images"),
            Path::new("dist/images"),
        );
        assert_eq!(out, PathBuf::from("dist/images/icons/a.png"));
    }

    #[test]
    fn test_detect_image_kind_by_content_and_extension() {
        let temp = TempDir::new().unwrap();
        let png_named_jpg = temp.path().join("fake.jpg");
        std::fs::write(&png_named_jpg, b"\x89PNG\r\n\x1a\n0000000000").unwrap();
        assert_eq!(FileManager::detect_image_kind(&png_named_jpg), ImageKind::Png);

        let svg = temp.path().join("icon.svg");
        std::fs::write(&svg, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();
        assert_eq!(FileManager::detect_image_kind(&svg), ImageKind::Svg);

        let txt = temp.path().join("notes.txt");
        std::fs::write(&txt, "hello").unwrap();
        assert_eq!(FileManager::detect_image_kind(&txt), ImageKind::Other);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(2048), "2.00 KB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 50), 75.0);
    }
}
