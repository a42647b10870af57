// External tool discovery
//
// Detection is synchronous and runs once at startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let (path, version) = self.detect_tool(tool_type);

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: path.is_some(),
            version,
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    /// Log what is installed; returns false when yt-dlp is missing
    pub fn report(&self, python_cmd: &str) -> bool {
        let mut ytdlp_ok = false;
        for tool in self.get_all_tools() {
            if tool.is_available {
                info!(
                    target: "tools",
                    tool = %tool.name,
                    path = tool.path.as_deref().unwrap_or_default(),
                    version = tool.version.as_deref().unwrap_or("unknown"),
                    "tool available"
                );
            } else {
                warn!(target: "tools", tool = %tool.name, "tool not found");
            }
            if tool.tool_type == ToolType::YtDlp {
                ytdlp_ok = tool.is_available;
            }
        }

        if python_has_module(python_cmd, "yt_dlp") {
            info!(target: "tools", python = python_cmd, "python yt_dlp module available");
        } else {
            warn!(target: "tools", python = python_cmd, "python yt_dlp module not found");
        }

        ytdlp_ok
    }

    fn candidate_paths(binary_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("/opt/homebrew/bin").join(binary_name),
            PathBuf::from("/usr/local/bin").join(binary_name),
            PathBuf::from("/usr/bin").join(binary_name),
        ];
        // pip --user installs
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".local").join("bin").join(binary_name));
        }
        paths
    }

    fn detect_tool(&self, tool_type: ToolType) -> (Option<String>, Option<String>) {
        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        for path in Self::candidate_paths(binary_name) {
            if path.is_file() {
                let path = path.to_string_lossy().into_owned();
                let version = self.get_version(&path, tool_type);
                return (Some(path), version);
            }
        }

        // 2. Try PATH
        if let Ok(output) = Command::new("which").arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    let version = self.get_version(&path, tool_type);
                    return (Some(path), version);
                }
            }
        }

        (None, None)
    }

    fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                let out = String::from_utf8_lossy(&output.stdout);
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Path to run yt-dlp with: the detected binary, or the bare name for PATH lookup
pub fn resolve_ytdlp() -> String {
    ToolManager::new()
        .get_tool_info(ToolType::YtDlp)
        .path
        .unwrap_or_else(|| ToolType::YtDlp.as_str().to_string())
}

/// Whether `python_cmd -c "import <module>"` succeeds
pub fn python_has_module(python_cmd: &str, module: &str) -> bool {
    Command::new(python_cmd)
        .args(["-c", &format!("import {}", module)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
