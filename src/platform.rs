//! # Platform-specific utilities
//!
//! Questo modulo centralizza tutta la logica per l'esecuzione dei tool esterni
//! (codec immagine, minificatore JS, svgo). Ogni formato ha una catena di tool
//! in ordine di preferenza: il primo disponibile che termina con successo vince.
//!
//! ## Strategia:
//! - Risoluzione path tramite `ToolPathResolver` (node_modules/.bin, TOOLS_DIR, PATH)
//! - Tool non disponibile ⇒ si passa al successivo
//! - Tool fallito ⇒ warning e si passa al successivo
//! - Nessun tool disponibile ⇒ `MissingDependency` con la lista dei candidati
//! - Tutti falliti ⇒ `ToolFailed` con lo stderr dell'ultimo tentativo

use crate::error::PipelineError;
use crate::tool_resolver::ToolPathResolver;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Builds the argument list of a tool from (input, output)
pub type ArgsBuilder<'a> = Box<dyn Fn(&str, &str) -> Vec<String> + Send + Sync + 'a>;

/// One entry of a tool chain
pub struct ToolCandidate<'a> {
    pub name: &'static str,
    pub args: ArgsBuilder<'a>,
}

impl<'a> ToolCandidate<'a> {
    pub fn new(name: &'static str, args: impl Fn(&str, &str) -> Vec<String> + Send + Sync + 'a) -> Self {
        Self {
            name,
            args: Box::new(args),
        }
    }

    /// Arguments this tool would receive for (input, output)
    pub fn arguments(&self, input: &str, output: &str) -> Vec<String> {
        (self.args)(input, output)
    }
}

/// Converts any iterable of string-like items into owned argument strings
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Platform-specific command manager with tool resolution
pub struct PlatformCommands {
    tool_resolver: ToolPathResolver,
}

impl PlatformCommands {
    pub fn for_project(project_root: &Path) -> Self {
        Self {
            tool_resolver: ToolPathResolver::for_project(project_root),
        }
    }

    /// Get the resolved path to a tool
    pub fn get_tool_path(&self, base_name: &str) -> Option<PathBuf> {
        self.tool_resolver.resolve_tool(base_name)
    }

    /// Get a report of the given tools
    pub fn get_tools_report(&self, tools: &[&str]) -> String {
        self.tool_resolver.get_tools_report(tools)
    }

    /// Run the first available tool of `tools` that succeeds on `input`, producing `output`.
    pub async fn run_tool_chain(
        &self,
        input: &Path,
        output: &Path,
        tools: &[ToolCandidate<'_>],
        format_name: &str,
    ) -> Result<&'static str> {
        let input_str = input
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid input path: {:?}", input))?;
        let output_str = output
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid output path: {:?}", output))?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut last_failure: Option<PipelineError> = None;

        for tool in tools {
            let Some(tool_path) = self.get_tool_path(tool.name) else {
                continue;
            };

            let args = tool.arguments(input_str, output_str);
            debug!("Attempting {} with {} {:?}", format_name, tool.name, args);

            let start_time = Instant::now();
            let result = match Command::new(&tool_path).args(&args).output().await {
                Ok(result) => result,
                Err(e) => {
                    warn!("{} could not start {}, trying next tool: {}", format_name, tool.name, e);
                    last_failure = Some(PipelineError::ToolFailed {
                        tool: tool.name.to_string(),
                        input: input.display().to_string(),
                        message: format!("failed to start {}: {}", tool_path.display(), e),
                    });
                    continue;
                }
            };
            let elapsed = start_time.elapsed();

            if result.status.success() {
                debug!("{} done with {} in {:?}", format_name, tool.name, elapsed);
                return Ok(tool.name);
            }

            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            warn!(
                "{} failed with {} after {:?}, trying next tool: {}",
                format_name, tool.name, elapsed, stderr
            );
            last_failure = Some(PipelineError::ToolFailed {
                tool: tool.name.to_string(),
                input: input.display().to_string(),
                message: if stderr.is_empty() {
                    format!("exit status {}", result.status)
                } else {
                    stderr
                },
            });
        }

        match last_failure {
            Some(failure) => {
                error!("All {} tools failed for: {}", format_name, input.display());
                Err(failure.into())
            }
            None => {
                let tool_names: Vec<&str> = tools.iter().map(|t| t.name).collect();
                error!("No {} tools available ({})", format_name, tool_names.join("/"));
                Err(PipelineError::MissingDependency(format!(
                    "no {} tool available, install one of: {}",
                    format_name,
                    tool_names.join(", ")
                ))
                .into())
            }
        }
    }

    /// Get system information for debugging
    pub fn system_info() -> SystemInfo {
        SystemInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            family: std::env::consts::FAMILY,
        }
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_string_vec() {
        let quality = 82;
        let result = to_string_vec(["-q", &quality.to_string(), "-mt"]);
        assert_eq!(result, vec!["-q".to_string(), "82".to_string(), "-mt".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_tools_error_lists_candidates() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in.gif");
        std::fs::write(&input, b"GIF89a").unwrap();

        let platform = PlatformCommands::for_project(temp.path());
        let tools = [
            ToolCandidate::new("no-such-gif-tool-a", |i, o| to_string_vec([i, o])),
            ToolCandidate::new("no-such-gif-tool-b", |i, o| to_string_vec([i, o])),
        ];
        let err = platform
            .run_tool_chain(&input, &temp.path().join("out.gif"), &tools, "GIF")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("no-such-gif-tool-a"));
        assert!(message.contains("no-such-gif-tool-b"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_that_cannot_start_falls_through() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("node_modules/.bin");
        std::fs::create_dir_all(&bin).unwrap();
        // Present but not executable, spawning it fails with EACCES
        let broken = bin.join("broken-codec");
        std::fs::write(&broken, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&broken, std::fs::Permissions::from_mode(0o644)).unwrap();

        let input = temp.path().join("in.txt");
        std::fs::write(&input, b"payload").unwrap();
        let output = temp.path().join("out.txt");

        let platform = PlatformCommands::for_project(temp.path());
        if platform.get_tool_path("broken-codec").is_none() || platform.get_tool_path("cp").is_none() {
            return;
        }
        let tools = [
            ToolCandidate::new("broken-codec", |i, o| to_string_vec([i, o])),
            ToolCandidate::new("cp", |i, o| to_string_vec([i, o])),
        ];
        let used = platform.run_tool_chain(&input, &output, &tools, "copy").await.unwrap();
        assert_eq!(used, "cp");
        assert_eq!(std::fs::read(&output).unwrap(), b"payload");

        let err = platform
            .run_tool_chain(&input, &output, &tools[..1], "copy")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken-codec"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_falls_through() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in.txt");
        std::fs::write(&input, b"payload").unwrap();
        let output = temp.path().join("out.txt");

        let platform = PlatformCommands::for_project(temp.path());
        if platform.get_tool_path("false").is_none() || platform.get_tool_path("cp").is_none() {
            return;
        }
        let tools = [
            ToolCandidate::new("false", |_i, _o| Vec::new()),
            ToolCandidate::new("cp", |i, o| to_string_vec([i, o])),
        ];
        let used = platform.run_tool_chain(&input, &output, &tools, "copy").await.unwrap();
        assert_eq!(used, "cp");
        assert!(output.exists());
    }

    #[test]
    fn test_system_info() {
        let info = PlatformCommands::system_info();
        assert!(!info.os.is_empty());
        assert!(!info.arch.is_empty());
        assert!(!info.family.is_empty());
    }
}
