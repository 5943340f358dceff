//! # HTML Minification Module
//!
//! Questo modulo minifica le pagine HTML dell'albero di staging.
//!
//! ## Responsabilità:
//! - Selezione di ogni `*.html` sotto la directory sorgente
//! - Collasso degli spazi non significativi (`minify-html`)
//! - Scrittura nella distribuzione preservando i path relativi
//!
//! ## Cosa resta invariato:
//! - Tag di chiusura e apertura di `<html>`/`<head>`
//! - Commenti
//! - CSS e JS inline

use crate::file_manager::{FileManager, SourceSet};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

fn minify_config() -> minify_html::Cfg {
    let mut cfg = minify_html::Cfg::new();
    // Whitespace only: keep markup structure, comments and inline assets as authored
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = true;
    cfg.ensure_spec_compliant_unquoted_attribute_values = true;
    cfg.minify_css = false;
    cfg.minify_js = false;
    cfg
}

/// Collapse whitespace in a single document
pub fn collapse_whitespace(html: &[u8]) -> Vec<u8> {
    minify_html::minify(html, &minify_config())
}

/// Minify every `*.html` under `source_dir` into `dest_dir`
pub async fn minify_tree(source_dir: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let files = SourceSet::new(source_dir).include("**/*.html")?.resolve_nonempty()?;
    let mut outputs = Vec::with_capacity(files.len());

    for file in files {
        let html = tokio::fs::read(&file).await?;
        let minified = collapse_whitespace(&html);
        let output = FileManager::output_path(&file, source_dir, dest_dir);
        FileManager::write(&output, &minified).await?;
        debug!(
            "Minified {} ({} -> {})",
            file.display(),
            FileManager::format_size(html.len() as u64),
            FileManager::format_size(minified.len() as u64)
        );
        outputs.push(output);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collapse_whitespace() {
        let html = b"<!doctype html>\n<html>\n  <head>\n    <title>  Demo  </title>\n  </head>\n  <body>\n    <p>Hello</p>\n  </body>\n</html>\n";
        let minified = String::from_utf8(collapse_whitespace(html)).unwrap();

        assert!(minified.len() < html.len());
        assert!(minified.contains("<p>Hello</p>"));
        assert!(!minified.contains("\n    "));
    }

    #[tokio::test]
    async fn test_minify_tree_preserves_structure() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        std::fs::create_dir_all(app.join("pages")).unwrap();
        std::fs::write(app.join("index.html"), "<html>\n <body>\n  <h1>Home</h1>\n </body>\n</html>").unwrap();
        std::fs::write(app.join("pages/about.html"), "<p>\n  About\n</p>").unwrap();

        let dist = temp.path().join("dist");
        let outputs = minify_tree(&app, &dist).await.unwrap();

        assert_eq!(outputs.len(), 2);
        assert!(dist.join("index.html").exists());
        assert!(dist.join("pages/about.html").exists());
    }

    #[tokio::test]
    async fn test_no_html_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(minify_tree(temp.path(), &temp.path().join("dist")).await.is_err());
    }
}
