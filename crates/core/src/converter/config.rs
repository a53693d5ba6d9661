//! Configuration for the built-in converters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by the built-in converters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Explicit tool locations (`ffmpeg = "/opt/ffmpeg/bin/ffmpeg"`), bypassing lookup.
    #[serde(default)]
    pub tool_paths: HashMap<String, PathBuf>,

    /// Timeout for a single external tool invocation, in seconds.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Default video quality preset when a job does not set one.
    #[serde(default = "default_video_quality")]
    pub video_quality: String,

    /// Default AAC audio bitrate in kbps.
    #[serde(default = "default_audio_bitrate")]
    pub video_audio_bitrate_kbps: u32,

    /// Scratch directory for tool profiles and intermediate files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_tool_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_video_quality() -> String {
    "medium".to_string()
}

fn default_audio_bitrate() -> u32 {
    128
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("docforge")
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            tool_paths: HashMap::new(),
            tool_timeout_secs: default_tool_timeout(),
            ffmpeg_log_level: default_log_level(),
            video_quality: default_video_quality(),
            video_audio_bitrate_kbps: default_audio_bitrate(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl ConverterConfig {
    /// Pins a tool to an explicit path.
    pub fn with_tool_path(mut self, tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.tool_paths.insert(tool.into(), path.into());
        self
    }

    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sets the per-tool timeout in seconds.
    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}
