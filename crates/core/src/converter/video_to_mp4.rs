//! FFmpeg-backed video to MP4 (H.264 + AAC) converter.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use super::config::ConverterConfig;
use super::support::{ensure_extension, ensure_parent_dir, input_size, write_placeholder};
use super::traits::Converter;
use super::types::{ConversionResult, ConvertOptions, ConverterInfo, DependencyStatus};
use crate::process::{ExecOptions, ToolLocator};

pub const ID: &str = "video-to-mp4";

const INPUT_EXTENSIONS: &[&str] = &[
    ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".mpeg", ".mpg", ".3gp", ".ts", ".m4v", ".mp4",
];

const INSTALL_HINT: &str = "apt-get install ffmpeg (Linux) or choco install ffmpeg (Windows)";

const DRY_RUN_CONTENTS: &[u8] = b"DRY_RUN_MP4_VIDEO";

/// Quality preset mapped onto the x264 constant rate factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    High,
    Medium,
    Low,
}

impl VideoQuality {
    /// Parses a preset name; unknown names fall back to medium.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn crf(self) -> u8 {
        match self {
            Self::High => 18,
            Self::Medium => 23,
            Self::Low => 28,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Encoding settings for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub quality: VideoQuality,
    pub max_width: Option<u64>,
    pub max_height: Option<u64>,
    pub audio_bitrate_kbps: u64,
}

impl VideoSettings {
    /// Reads `quality`, `maxWidth`, `maxHeight` and `audioBitrate` from the
    /// job options, falling back to the configured defaults.
    pub fn from_options(options: &ConvertOptions, config: &ConverterConfig) -> Self {
        Self {
            quality: VideoQuality::parse(
                options
                    .param_str("quality")
                    .unwrap_or(config.video_quality.as_str()),
            ),
            max_width: options.param_u64("maxWidth").filter(|w| *w > 0),
            max_height: options.param_u64("maxHeight").filter(|h| *h > 0),
            audio_bitrate_kbps: options
                .param_u64("audioBitrate")
                .filter(|b| *b > 0)
                .unwrap_or(u64::from(config.video_audio_bitrate_kbps)),
        }
    }
}

/// Builds the ffmpeg argument list.
pub fn build_args(input: &Path, output: &Path, settings: &VideoSettings, log_level: &str) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        log_level.to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        settings.quality.crf().to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", settings.audio_bitrate_kbps),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ];

    // Scale down only, keeping the aspect ratio
    if settings.max_width.is_some() || settings.max_height.is_some() {
        let width = settings
            .max_width
            .map(|w| format!("'min({},iw)'", w))
            .unwrap_or_else(|| "iw".to_string());
        let height = settings
            .max_height
            .map(|h| format!("'min({},ih)'", h))
            .unwrap_or_else(|| "ih".to_string());
        args.extend([
            "-vf".to_string(),
            format!("scale={}:{}:force_original_aspect_ratio=decrease", width, height),
        ]);
    }

    args.extend([
        "-f".to_string(),
        "mp4".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]);
    args
}

/// Converts any common video container to MP4.
pub struct VideoToMp4Converter {
    config: ConverterConfig,
    locator: ToolLocator,
}

impl VideoToMp4Converter {
    pub fn new(config: ConverterConfig, locator: ToolLocator) -> Self {
        Self { config, locator }
    }
}

#[async_trait]
impl Converter for VideoToMp4Converter {
    fn info(&self) -> ConverterInfo {
        ConverterInfo::new(ID, "Video to MP4")
            .inputs(INPUT_EXTENSIONS)
            .outputs(&["mp4"])
            .tools(&["ffmpeg"])
    }

    async fn convert(&self, input: &Path, output: &Path, options: &ConvertOptions) -> ConversionResult {
        let start = Instant::now();
        let mut metadata = Map::new();

        let input_bytes = match input_size(input).await {
            Ok(size) => size,
            Err(e) => return ConversionResult::failed_with(e, metadata),
        };
        metadata.insert("inputSize".to_string(), Value::from(input_bytes));
        if let Err(e) = ensure_extension(input, INPUT_EXTENSIONS) {
            return ConversionResult::failed_with(e, metadata);
        }

        let settings = VideoSettings::from_options(options, &self.config);
        metadata.insert("quality".to_string(), Value::from(settings.quality.as_str()));

        if options.dry_run {
            if let Err(e) = write_placeholder(output, DRY_RUN_CONTENTS, &mut metadata).await {
                return ConversionResult::failed_with(format!("Dry-run failed: {}", e), metadata);
            }
            metadata.insert("durationMs".to_string(), Value::from(start.elapsed().as_millis() as u64));
            return ConversionResult::ok(metadata);
        }

        let Some(ffmpeg) = self.locator.locate("ffmpeg").await else {
            return ConversionResult::failed_with(
                DependencyStatus::missing("ffmpeg", INSTALL_HINT).message,
                metadata,
            );
        };

        if let Err(e) = ensure_parent_dir(output).await {
            return ConversionResult::failed_with(
                format!("Failed to create output directory: {}", e),
                metadata,
            );
        }

        let args = build_args(input, output, &settings, &self.config.ffmpeg_log_level);
        debug!(ffmpeg = %ffmpeg.display(), ?args, "Running ffmpeg");

        let exec_options = ExecOptions::new(options.tool_timeout_or(self.config.tool_timeout()))
            .cancel_on(options.cancel.clone());
        let outcome = match self.locator.executor().execute(&ffmpeg, &args, &exec_options).await {
            Ok(outcome) => outcome,
            Err(e) => return ConversionResult::failed_with(format!("Conversion failed: {}", e), metadata),
        };
        if !outcome.success() {
            return ConversionResult::failed_with(
                format!("Conversion failed: {}", outcome.failure_reason("FFmpeg")),
                metadata,
            );
        }

        let output_bytes = match tokio::fs::metadata(output).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return ConversionResult::failed_with(
                    format!("Conversion failed: output not readable: {}", e),
                    metadata,
                )
            }
        };
        if input_bytes > 0 {
            let ratio = (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0;
            metadata.insert("compressionRatio".to_string(), Value::from(format!("{:.1}%", ratio)));
        }
        metadata.insert("outputSize".to_string(), Value::from(output_bytes));
        metadata.insert("crf".to_string(), Value::from(settings.quality.crf()));
        metadata.insert("outputPath".to_string(), Value::from(output.display().to_string()));
        metadata.insert("durationMs".to_string(), Value::from(start.elapsed().as_millis() as u64));

        info!(
            input_bytes,
            output_bytes,
            crf = settings.quality.crf(),
            "Video converted to MP4"
        );
        ConversionResult::ok(metadata)
    }

    async fn check_dependencies(&self) -> DependencyStatus {
        match self.locator.probe("ffmpeg").await {
            Some(info) => DependencyStatus::found("ffmpeg", info),
            None => DependencyStatus::missing("ffmpeg", INSTALL_HINT),
        }
    }
}
