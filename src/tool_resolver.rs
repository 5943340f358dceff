//! # Tool Path Resolver
//!
//! This module handles finding the external transformation tools:
//! - Project-local npm installs (`node_modules/.bin`)
//! - A `TOOLS_DIR` override (vendored binaries, CI images)
//! - System-installed tools on `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tool path resolver for project-local and system tools
pub struct ToolPathResolver {
    /// Project-local directories searched before PATH
    search_dirs: Vec<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver for a specific project root
    pub fn for_project(project_root: &Path) -> Self {
        let mut search_dirs = Vec::new();

        if let Ok(tools_dir) = env::var("TOOLS_DIR") {
            let tools_path = PathBuf::from(tools_dir);
            debug!("Checking TOOLS_DIR environment variable: {:?}", tools_path);
            if tools_path.exists() {
                search_dirs.push(tools_path);
            }
        }

        let node_bin = project_root.join("node_modules").join(".bin");
        if node_bin.exists() {
            debug!("Found project-local node tools: {:?}", node_bin);
            search_dirs.push(node_bin);
        }

        Self { search_dirs }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        for dir in &self.search_dirs {
            if let Some(path) = Self::candidate_in(dir, tool_name) {
                debug!("Using project tool: {} -> {:?}", tool_name, path);
                return Some(path);
            }
        }

        let system_path = self.find_in_system_path(tool_name);
        match &system_path {
            Some(path) => debug!("Using system tool: {} -> {:?}", tool_name, path),
            None => debug!("Tool not found: {}", tool_name),
        }
        system_path
    }

    fn candidate_in(dir: &Path, tool_name: &str) -> Option<PathBuf> {
        let extensions: &[&str] = if cfg!(windows) { &[".exe", ".cmd", ""] } else { &[""] };
        extensions
            .iter()
            .map(|ext| dir.join(format!("{}{}", tool_name, ext)))
            .find(|path| path.is_file())
    }

    /// Find tool in system PATH
    fn find_in_system_path(&self, tool_name: &str) -> Option<PathBuf> {
        let path_var = env::var_os("PATH")?;
        env::split_paths(&path_var).find_map(|dir| Self::candidate_in(&dir, tool_name))
    }

    /// Report of the given tools and where they resolve
    pub fn get_tools_report(&self, tools: &[&str]) -> String {
        tools
            .iter()
            .map(|tool| match self.resolve_tool(tool) {
                Some(path) => format!("✅ {} -> {}", tool, path.display()),
                None => format!("❌ {} not found", tool),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
