//! # Image Processing Module
//!
//! Questo modulo gestisce l'ottimizzazione delle immagini di staging e la conversione
//! incrementale in WebP utilizzando esclusivamente tool esterni, come nel resto della
//! pipeline.
//!
//! ## Formati Supportati
//!
//! | Formato | Trasformazione                    | Tool Utilizzati              |
//! |---------|-----------------------------------|------------------------------|
//! | GIF     | interlacciamento                  | gifsicle                     |
//! | JPEG    | qualità 82, progressive           | mozjpeg, cjpeg, jpegtran     |
//! | PNG     | livello di ottimizzazione 5       | optipng, oxipng              |
//! | SVG     | plugin svgo (removeViewBox on, cleanupIds off) | svgo            |
//! | Altri   | copiati senza modifiche           | -                            |
//!
//! ## Rilevamento formato
//!
//! Il formato è determinato dai magic bytes (crate `image`, solo detection) con
//! fallback sull'estensione: un PNG salvato come `.jpg` passa comunque da optipng.
//!
//! ## Conversione WebP incrementale
//!
//! 1. **Selezione**: JPEG/PNG sotto `app/images`, esclusa la sottocartella favicon
//! 2. **Filtro**: solo file nuovi o modificati rispetto al watermark dello stage
//!    (`StateManager`, fingerprint per contenuto)
//! 3. **Conversione**: cwebp qualità 82, output accanto al sorgente con estensione `.webp`
//! 4. **Watermark**: avanzato solo se tutte le conversioni riescono
//!
//! `delete_webp` rimuove tutti i `.webp` generati; il chiamante azzera lo stato dello stage.
//!
//! ## Concorrenza
//!
//! - Fino a `config.workers` processi esterni in parallelo (`buffer_unordered`)
//! - Il primo errore rende fallito l'intero stage
//!
//! ## Esempio:
//! ```rust,ignore
//! let processor = ImageProcessor::new(&config, &platform, true);
//! let stats = processor.optimize_tree(&images_dir, &dist_images).await?;
//! let converted = processor.convert_new_to_webp(&images_dir, &favicon_dir, &mut state).await?;
//! ```

use crate::config::{Config, SvgoPlugin};
use crate::file_manager::{to_slash, FileManager, ImageKind, SourceSet};
use crate::platform::{to_string_vec, PlatformCommands, ToolCandidate};
use crate::progress::{OptimizationStats, ProgressManager};
use crate::state::{ProcessedFile, StateManager};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// State key of the incremental WebP stage
pub const WEBP_STAGE: &str = "webp";

/// What happened to a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Optimized { original_size: u64, new_size: u64 },
    PassedThrough { size: u64 },
}

/// Optimizes staged images and converts new rasters to WebP
pub struct ImageProcessor<'a> {
    config: &'a Config,
    platform: &'a PlatformCommands,
    show_progress: bool,
}

impl<'a> ImageProcessor<'a> {
    pub fn new(config: &'a Config, platform: &'a PlatformCommands, show_progress: bool) -> Self {
        Self {
            config,
            platform,
            show_progress,
        }
    }

    /// Optimize every file under `images_dir` into `dest_dir`, preserving relative paths.
    pub async fn optimize_tree(&self, images_dir: &Path, dest_dir: &Path) -> Result<OptimizationStats> {
        let files = SourceSet::new(images_dir).include("**/*.*")?.resolve_nonempty()?;
        info!("Optimizing {} image(s) from {}", files.len(), images_dir.display());

        let svgo_config = write_svgo_config(&self.config.svgo_plugins)?;
        let progress = ProgressManager::new(files.len() as u64, self.show_progress);

        let results: Vec<(PathBuf, Result<FileOutcome>)> = stream::iter(files)
            .map(|file| {
                let svgo_config = svgo_config.path();
                let progress = progress.clone();
                async move {
                    let result = self.optimize(&file, images_dir, dest_dir, svgo_config).await;
                    let name = file.file_name().unwrap_or_default().to_string_lossy().to_string();
                    match &result {
                        Ok(FileOutcome::Optimized { original_size, new_size }) => progress.update(&format!(
                            "✅ {}: {:.1}% saved",
                            name,
                            FileManager::calculate_reduction(*original_size, *new_size)
                        )),
                        Ok(FileOutcome::PassedThrough { .. }) => progress.update(&format!("⏩ {}: copied", name)),
                        Err(_) => progress.update(&format!("❌ {}: error", name)),
                    }
                    (file, result)
                }
            })
            .buffer_unordered(self.config.workers)
            .collect()
            .await;

        let mut stats = OptimizationStats::new();
        for (file, result) in results {
            match result? {
                FileOutcome::Optimized { original_size, new_size } => {
                    debug!("{}: {} -> {}", file.display(), original_size, new_size);
                    stats.add_optimized(original_size, new_size);
                }
                FileOutcome::PassedThrough { size } => stats.add_passed_through(size),
            }
        }

        progress.finish(&stats.format_summary());
        info!("{}", stats.format_summary());
        Ok(stats)
    }

    /// Optimize a single image into the mirrored location under `dest_dir`
    pub async fn optimize(
        &self,
        input: &Path,
        images_dir: &Path,
        dest_dir: &Path,
        svgo_config: &Path,
    ) -> Result<FileOutcome> {
        let output = FileManager::output_path(input, images_dir, dest_dir);
        let (original_size, _) = FileManager::get_file_info(input).await?;

        let (chain, format_name) = match FileManager::detect_image_kind(input) {
            ImageKind::Gif => (self.gif_chain(), "GIF"),
            ImageKind::Jpeg => (self.jpeg_chain(), "JPEG"),
            ImageKind::Png => (self.png_chain(), "PNG"),
            ImageKind::Svg => (svg_chain(svgo_config), "SVG"),
            ImageKind::Other => {
                FileManager::copy_preserving(input, images_dir, dest_dir).await?;
                debug!("Passed through unrecognized file: {}", input.display());
                return Ok(FileOutcome::PassedThrough { size: original_size });
            }
        };

        self.platform.run_tool_chain(input, &output, &chain, format_name).await?;
        let (new_size, _) = FileManager::get_file_info(&output).await?;
        Ok(FileOutcome::Optimized {
            original_size,
            new_size,
        })
    }

    fn gif_chain(&self) -> Vec<ToolCandidate<'static>> {
        let interlaced = self.config.gif_interlaced;
        vec![ToolCandidate::new("gifsicle", move |input, output| {
            let mut args = Vec::new();
            if interlaced {
                args.push("--interlace".to_string());
            }
            args.extend(to_string_vec(["--optimize=1", "-o", output, input]));
            args
        })]
    }

    fn jpeg_chain(&self) -> Vec<ToolCandidate<'static>> {
        let quality = self.config.jpeg_quality.to_string();
        let cjpeg_quality = quality.clone();
        vec![
            ToolCandidate::new("mozjpeg", move |input, output| {
                to_string_vec(["-quality", &quality, "-optimize", "-progressive", "-outfile", output, input])
            }),
            ToolCandidate::new("cjpeg", move |input, output| {
                to_string_vec(["-quality", &cjpeg_quality, "-optimize", "-progressive", "-outfile", output, input])
            }),
            // Lossless only, quality is ignored
            ToolCandidate::new("jpegtran", |input, output| {
                to_string_vec(["-copy", "none", "-optimize", "-progressive", "-outfile", output, input])
            }),
        ]
    }

    fn png_chain(&self) -> Vec<ToolCandidate<'static>> {
        let level = self.config.png_optimization_level;
        let optipng_level = format!("-o{}", level);
        let oxipng_level = level.min(6).to_string();
        vec![
            ToolCandidate::new("optipng", move |input, output| {
                to_string_vec([optipng_level.as_str(), "-clobber", "-quiet", "-out", output, input])
            }),
            ToolCandidate::new("oxipng", move |input, output| {
                to_string_vec(["-o", oxipng_level.as_str(), "--strip", "safe", "--out", output, input])
            }),
        ]
    }

    fn webp_chain(&self) -> Vec<ToolCandidate<'static>> {
        let quality = self.config.webp_quality.to_string();
        vec![ToolCandidate::new("cwebp", move |input, output| {
            to_string_vec(["-q", &quality, "-m", "4", "-mt", input, "-o", output])
        })]
    }

    /// Convert JPEG/PNG files that are new since the last successful run.
    /// Returns the number of converted files.
    pub async fn convert_new_to_webp(
        &self,
        images_dir: &Path,
        favicon_dir: &Path,
        state: &mut StateManager,
    ) -> Result<usize> {
        let pending = select_webp_candidates(images_dir, favicon_dir, state).await?;
        if pending.is_empty() {
            info!("No new images to convert to WebP");
            state.record_success(WEBP_STAGE);
            state.save().await?;
            return Ok(0);
        }

        info!("Converting {} new image(s) to WebP", pending.len());
        let progress = ProgressManager::new(pending.len() as u64, self.show_progress);
        let chain = self.webp_chain();

        let results: Vec<(PathBuf, Result<&'static str>)> = stream::iter(pending)
            .map(|file| {
                let chain = &chain;
                let progress = progress.clone();
                async move {
                    let output = webp_output_path(&file);
                    let result = self.platform.run_tool_chain(&file, &output, chain, "WebP conversion").await;
                    progress.update(&file.file_name().unwrap_or_default().to_string_lossy());
                    (file, result)
                }
            })
            .buffer_unordered(self.config.workers)
            .collect()
            .await;

        let mut converted = 0;
        let mut first_error = None;
        for (file, result) in results {
            match result {
                Ok(_) => {
                    state.mark_processed(WEBP_STAGE, ProcessedFile::fingerprint(&file).await?);
                    converted += 1;
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            // Keep what did convert, but do not advance the watermark
            state.save().await?;
            progress.finish("WebP conversion failed");
            return Err(e);
        }

        state.record_success(WEBP_STAGE);
        state.save().await?;
        progress.finish(&format!("Converted {} image(s) to WebP", converted));
        Ok(converted)
    }
}

fn svg_chain(svgo_config: &Path) -> Vec<ToolCandidate<'static>> {
    let config_path = svgo_config.to_string_lossy().to_string();
    vec![ToolCandidate::new("svgo", move |input, output| {
        to_string_vec(["--config", config_path.as_str(), "-i", input, "-o", output])
    })]
}

/// SVGO configuration module enabling/disabling plugins on top of the default preset
pub fn svgo_config_contents(plugins: &[SvgoPlugin]) -> String {
    let overrides: serde_json::Map<String, serde_json::Value> = plugins
        .iter()
        .filter(|p| !p.active)
        .map(|p| (p.name.clone(), serde_json::Value::Bool(false)))
        .collect();

    let mut entries = vec![serde_json::json!({
        "name": "preset-default",
        "params": { "overrides": overrides }
    })];
    entries.extend(
        plugins
            .iter()
            .filter(|p| p.active)
            .map(|p| serde_json::Value::String(p.name.clone())),
    );

    format!("module.exports = {};\n", serde_json::json!({ "plugins": entries }))
}

fn write_svgo_config(plugins: &[SvgoPlugin]) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("svgo-")
        .suffix(".config.cjs")
        .tempfile()?;
    file.write_all(svgo_config_contents(plugins).as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// `hero.jpg` -> `hero.webp`, next to the source
pub fn webp_output_path(input: &Path) -> PathBuf {
    input.with_extension("webp")
}

/// JPEG/PNG files under `images_dir` (favicon subtree excluded) that the WebP stage has
/// not processed yet. An empty base selection is a stage error.
pub async fn select_webp_candidates(
    images_dir: &Path,
    favicon_dir: &Path,
    state: &StateManager,
) -> Result<Vec<PathBuf>> {
    let mut sources = SourceSet::new(images_dir)
        .include("**/*.jpg")?
        .include("**/*.jpeg")?
        .include("**/*.png")?;
    if let Ok(favicon_rel) = favicon_dir.strip_prefix(images_dir) {
        sources = sources.exclude(&format!("{}/**", to_slash(favicon_rel)))?;
    }

    let mut pending = Vec::new();
    for file in sources.resolve_nonempty()? {
        if state.needs_processing(WEBP_STAGE, &file).await? {
            pending.push(file);
        } else {
            debug!("Already converted: {}", file.display());
        }
    }
    Ok(pending)
}

/// Delete every generated `.webp` below `images_dir`. Returns the number of removed files.
pub async fn delete_webp(images_dir: &Path) -> Result<usize> {
    let files = SourceSet::new(images_dir).include("**/*.webp")?.resolve()?;
    for file in &files {
        tokio::fs::remove_file(file).await?;
        debug!("Deleted {}", file.display());
    }
    info!("Deleted {} WebP file(s)", files.len());
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageEncoder;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n-not-really-a-png";

    fn write(root: &Path, rel: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_favicon_subtree_is_never_selected() {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("app/images");
        write(&images, "hero.jpg", b"jpeg");
        write(&images, "icons/logo.png", PNG_MAGIC);
        write(&images, "favicon/favicon.png", PNG_MAGIC);
        write(&images, "favicon/apple-touch.jpg", b"jpeg");
        write(&images, "sprite.svg", b"<svg/>");

        let state = StateManager::at(temp.path().join("state.json")).await.unwrap();
        let pending = select_webp_candidates(&images, &images.join("favicon"), &state)
            .await
            .unwrap();

        assert_eq!(pending, vec![images.join("hero.jpg"), images.join("icons/logo.png")]);
    }

    #[tokio::test]
    async fn test_second_selection_is_empty_without_new_files() {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("app/images");
        write(&images, "a.png", PNG_MAGIC);
        write(&images, "b.jpeg", b"jpeg");

        let mut state = StateManager::at(temp.path().join("state.json")).await.unwrap();
        let first = select_webp_candidates(&images, &images.join("favicon"), &state)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        for file in first {
            state.mark_processed(WEBP_STAGE, ProcessedFile::fingerprint(&file).await.unwrap());
        }

        let second = select_webp_candidates(&images, &images.join("favicon"), &state)
            .await
            .unwrap();
        assert!(second.is_empty());

        write(&images, "c.png", PNG_MAGIC);
        let third = select_webp_candidates(&images, &images.join("favicon"), &state)
            .await
            .unwrap();
        assert_eq!(third, vec![images.join("c.png")]);
    }

    #[tokio::test]
    async fn test_no_rasters_is_an_error() {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("images");
        write(&images, "logo.svg", b"<svg/>");
        let state = StateManager::at(temp.path().join("state.json")).await.unwrap();

        assert!(select_webp_candidates(&images, &images.join("favicon"), &state)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_convert_twice_converts_nothing_second_time() {
        let temp = TempDir::new().unwrap();
        let platform = PlatformCommands::for_project(temp.path());
        if platform.get_tool_path("cwebp").is_none() {
            return;
        }

        let images = temp.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        let mut png = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png)
            .write_image(&[255u8; 4 * 4 * 3], 4, 4, image::ColorType::Rgb8)
            .unwrap();
        std::fs::write(images.join("square.png"), &png).unwrap();

        let config = Config::default();
        let processor = ImageProcessor::new(&config, &platform, false);
        let mut state = StateManager::at(temp.path().join("state.json")).await.unwrap();

        let first = processor
            .convert_new_to_webp(&images, &images.join("favicon"), &mut state)
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert!(images.join("square.webp").exists());
        assert!(images.join("square.png").exists());

        let second = processor
            .convert_new_to_webp(&images, &images.join("favicon"), &mut state)
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_delete_webp_only_removes_webp() {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("images");
        write(&images, "a.webp", b"RIFF");
        write(&images, "nested/b.webp", b"RIFF");
        write(&images, "a.jpg", b"jpeg");

        assert_eq!(delete_webp(&images).await.unwrap(), 2);
        assert!(!images.join("a.webp").exists());
        assert!(!images.join("nested/b.webp").exists());
        assert!(images.join("a.jpg").exists());
        assert_eq!(delete_webp(&images).await.unwrap(), 0);
    }

    fn chain_args(chain: &[ToolCandidate<'_>]) -> Vec<(&'static str, Vec<String>)> {
        chain.iter().map(|tool| (tool.name, tool.arguments("in", "out"))).collect()
    }

    #[test]
    fn test_codec_chains_use_configured_settings() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let platform = PlatformCommands::for_project(temp.path());
        let processor = ImageProcessor::new(&config, &platform, false);

        assert_eq!(
            chain_args(&processor.gif_chain()),
            vec![("gifsicle", to_string_vec(["--interlace", "--optimize=1", "-o", "out", "in"]))]
        );
        assert_eq!(
            chain_args(&processor.jpeg_chain()),
            vec![
                (
                    "mozjpeg",
                    to_string_vec(["-quality", "82", "-optimize", "-progressive", "-outfile", "out", "in"])
                ),
                (
                    "cjpeg",
                    to_string_vec(["-quality", "82", "-optimize", "-progressive", "-outfile", "out", "in"])
                ),
                (
                    "jpegtran",
                    to_string_vec(["-copy", "none", "-optimize", "-progressive", "-outfile", "out", "in"])
                ),
            ]
        );
        assert_eq!(
            chain_args(&processor.png_chain()),
            vec![
                ("optipng", to_string_vec(["-o5", "-clobber", "-quiet", "-out", "out", "in"])),
                ("oxipng", to_string_vec(["-o", "5", "--strip", "safe", "--out", "out", "in"])),
            ]
        );
        assert_eq!(
            chain_args(&processor.webp_chain()),
            vec![("cwebp", to_string_vec(["-q", "82", "-m", "4", "-mt", "in", "-o", "out"]))]
        );
        assert_eq!(
            chain_args(&svg_chain(Path::new("svgo.config.cjs"))),
            vec![("svgo", to_string_vec(["--config", "svgo.config.cjs", "-i", "in", "-o", "out"]))]
        );
    }

    #[test]
    fn test_codec_chains_follow_config_overrides() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            gif_interlaced: false,
            jpeg_quality: 70,
            png_optimization_level: 7,
            webp_quality: 60,
            ..Config::default()
        };
        let platform = PlatformCommands::for_project(temp.path());
        let processor = ImageProcessor::new(&config, &platform, false);

        assert!(!chain_args(&processor.gif_chain())[0].1.contains(&"--interlace".to_string()));
        assert_eq!(chain_args(&processor.jpeg_chain())[0].1[1], "70");
        let png = chain_args(&processor.png_chain());
        assert_eq!(png[0].1[0], "-o7");
        assert_eq!(png[1].1[1], "6");
        assert_eq!(chain_args(&processor.webp_chain())[0].1[1], "60");
    }

    #[test]
    fn test_svgo_config_contents() {
        let contents = svgo_config_contents(&Config::default().svgo_plugins);
        assert!(contents.starts_with("module.exports = "));
        assert!(contents.contains(r#""cleanupIds":false"#));
        assert!(contents.contains(r#""removeViewBox""#));
        assert!(contents.contains("preset-default"));
    }

    #[test]
    fn test_webp_output_path() {
        assert_eq!(
            webp_output_path(Path::new("app/images/photos/hero.jpeg")),
            PathBuf::from("app/images/photos/hero.webp")
        );
    }

    #[tokio::test]
    async fn test_unrecognized_files_pass_through() {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("images");
        write(&images, "docs/readme.txt", b"plain text");
        write(&images, "photo.webp", b"RIFF....WEBPVP8 ");

        let config = Config::default();
        let platform = PlatformCommands::for_project(temp.path());
        let processor = ImageProcessor::new(&config, &platform, false);
        let dest = temp.path().join("dist/images");

        let stats = processor.optimize_tree(&images, &dest).await.unwrap();
        assert_eq!(stats.files_passed_through, 2);
        assert_eq!(std::fs::read(dest.join("docs/readme.txt")).unwrap(), b"plain text");
        assert!(dest.join("photo.webp").exists());
    }
}
