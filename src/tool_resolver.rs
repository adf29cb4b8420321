//! # Tool Path Resolver
//!
//! Trova l'eseguibile pngquant nei diversi ambienti:
//! - Path esplicito da configurazione o CLI
//! - Variabile d'ambiente `PNGQUANT_PATH`
//! - Tools distribuiti accanto all'eseguibile (`tools/<platform>/pngquant`)
//! - `PATH` di sistema
//!
//! Se non si trova nulla si usa il nome nudo: il lancio fallirà con
//! `LaunchFailed`, che è l'errore mostrato all'utente.

use serde::Serialize;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PNGQUANT: &str = "pngquant";
pub const PNGQUANT_PATH_ENV: &str = "PNGQUANT_PATH";
pub const TOOLS_DIR_ENV: &str = "TOOLS_DIR";

/// Where a resolved executable came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOrigin {
    Configured,
    Environment,
    Bundled,
    SystemPath,
    Fallback,
}

impl fmt::Display for ToolOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ToolOrigin::Configured => "configured",
            ToolOrigin::Environment => PNGQUANT_PATH_ENV,
            ToolOrigin::Bundled => "bundled",
            ToolOrigin::SystemPath => "PATH",
            ToolOrigin::Fallback => "not found, using bare name",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTool {
    pub path: PathBuf,
    pub origin: ToolOrigin,
}

/// Tool path resolver for different deployment environments
pub struct ToolPathResolver {
    configured: Option<PathBuf>,
    /// Base directory where tools are bundled
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            tools_dir: Self::detect_bundled_tools_dir(),
        }
    }

    pub fn with_tools_dir(configured: Option<PathBuf>, tools_dir: Option<PathBuf>) -> Self {
        Self { configured, tools_dir }
    }

    /// Detect the bundled tools directory
    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        if let Some(tools_dir) = env::var_os(TOOLS_DIR_ENV) {
            let tools_path = PathBuf::from(tools_dir);
            debug!("Checking {}: {:?}", TOOLS_DIR_ENV, tools_path);
            if tools_path.is_dir() {
                return Some(tools_path);
            }
        }

        let exe_path = env::current_exe().ok()?;
        let app_dir = exe_path.parent()?;
        let candidates = [app_dir.join("tools"), app_dir.join("resources").join("tools")];

        for path in candidates {
            debug!("Checking bundled path: {:?}", path);
            if path.is_dir() {
                debug!("Found bundled tools directory: {:?}", path);
                return Some(path);
            }
        }

        debug!("No bundled tools directory found");
        None
    }

    /// Resolve pngquant from the process environment
    pub fn resolve_pngquant(&self) -> ResolvedTool {
        self.resolve_with(env::var_os(PNGQUANT_PATH_ENV), env::var_os("PATH"))
    }

    fn resolve_with(&self, env_override: Option<OsString>, path_var: Option<OsString>) -> ResolvedTool {
        if let Some(ref path) = self.configured {
            debug!("Using configured pngquant: {:?}", path);
            return ResolvedTool {
                path: path.clone(),
                origin: ToolOrigin::Configured,
            };
        }

        if let Some(path) = env_override.filter(|p| !p.is_empty()) {
            debug!("Using pngquant from {}: {:?}", PNGQUANT_PATH_ENV, path);
            return ResolvedTool {
                path: PathBuf::from(path),
                origin: ToolOrigin::Environment,
            };
        }

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = Self::bundled_tool_path(tools_dir, PNGQUANT);
            if bundled_path.is_file() {
                debug!("Using bundled pngquant: {:?}", bundled_path);
                return ResolvedTool {
                    path: bundled_path,
                    origin: ToolOrigin::Bundled,
                };
            }
        }

        if let Some(system_path) = path_var.as_deref().and_then(|p| Self::find_in_path(p, PNGQUANT)) {
            debug!("Using system pngquant: {:?}", system_path);
            return ResolvedTool {
                path: system_path,
                origin: ToolOrigin::SystemPath,
            };
        }

        warn!("pngquant not found, conversions will fail until it is installed");
        ResolvedTool {
            path: PathBuf::from(PNGQUANT),
            origin: ToolOrigin::Fallback,
        }
    }

    /// Get the expected path for a bundled tool
    fn bundled_tool_path(tools_dir: &Path, tool_name: &str) -> PathBuf {
        let platform = if cfg!(target_os = "windows") {
            "windows"
        } else if cfg!(target_os = "macos") {
            "darwin"
        } else {
            env::consts::OS
        };

        tools_dir.join(platform).join(executable_name(tool_name))
    }

    /// Find tool in a PATH-style list of directories
    fn find_in_path(path_var: &OsStr, tool_name: &str) -> Option<PathBuf> {
        let file_name = executable_name(tool_name);
        env::split_paths(path_var)
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    /// Get a report of tool availability
    pub fn tools_report(&self) -> String {
        let resolved = self.resolve_pngquant();
        let mut report = String::new();
        report.push_str("Tool Path Resolver Report\n");
        report.push_str(&format!("Bundled tools dir: {:?}\n", self.tools_dir));

        if resolved.origin == ToolOrigin::Fallback {
            report.push_str(&format!("  ❌ {} (install with: {})\n", PNGQUANT, install_instructions()));
        } else {
            report.push_str(&format!(
                "  ✅ {} -> {:?} ({})\n",
                PNGQUANT, resolved.path, resolved.origin
            ));
        }

        report
    }
}

fn executable_name(tool_name: &str) -> String {
    let extension = if cfg!(windows) { ".exe" } else { "" };
    format!("{}{}", tool_name, extension)
}

fn install_instructions() -> &'static str {
    if cfg!(target_os = "macos") {
        "brew install pngquant"
    } else if cfg!(target_os = "windows") {
        "download from https://pngquant.org"
    } else {
        "sudo apt-get install pngquant"
    }
}
