//! LibreOffice-backed document to PDF converter.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::ConverterConfig;
use super::support::{ensure_extension, ensure_parent_dir, input_size, write_placeholder};
use super::traits::Converter;
use super::types::{ConversionResult, ConvertOptions, ConverterInfo, DependencyStatus};
use crate::process::{ExecOptions, ToolLocator};

pub const ID: &str = "docx-to-pdf";

const INPUT_EXTENSIONS: &[&str] = &[".docx", ".doc", ".odt", ".rtf"];

/// Executable names LibreOffice ships under.
const CANDIDATES: &[&str] = &["soffice", "libreoffice"];

const INSTALL_HINT: &str =
    "apt-get install libreoffice (Linux) or download from libreoffice.org (Windows)";

const DRY_RUN_CONTENTS: &[u8] = b"%PDF-1.4\nDRY_RUN_DOCX_TO_PDF\n%%EOF";

/// Builds the headless conversion arguments.
///
/// Each run gets its own user profile so concurrent conversions do not
/// fight over LibreOffice's profile lock.
pub fn build_args(input: &Path, out_dir: &Path, profile_dir: &Path) -> Vec<String> {
    let profile = profile_dir.to_string_lossy().replace('\\', "/");
    let profile = if profile.starts_with('/') {
        format!("file://{}", profile)
    } else {
        format!("file:///{}", profile)
    };
    vec![
        "--headless".to_string(),
        format!("-env:UserInstallation={}", profile),
        "--convert-to".to_string(),
        "pdf".to_string(),
        "--outdir".to_string(),
        out_dir.to_string_lossy().to_string(),
        input.to_string_lossy().to_string(),
    ]
}

/// Path LibreOffice writes to: the input stem with a `.pdf` extension.
fn generated_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    out_dir.join(format!("{}.pdf", stem))
}

/// Converts Word and OpenDocument files to PDF.
pub struct DocxToPdfConverter {
    config: ConverterConfig,
    locator: ToolLocator,
}

impl DocxToPdfConverter {
    pub fn new(config: ConverterConfig, locator: ToolLocator) -> Self {
        Self { config, locator }
    }
}

#[async_trait]
impl Converter for DocxToPdfConverter {
    fn info(&self) -> ConverterInfo {
        ConverterInfo::new(ID, "DOCX to PDF")
            .inputs(INPUT_EXTENSIONS)
            .outputs(&["pdf"])
            .tools(&["soffice"])
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

        if options.dry_run {
            if let Err(e) = write_placeholder(output, DRY_RUN_CONTENTS, &mut metadata).await {
                return ConversionResult::failed_with(format!("Dry-run failed: {}", e), metadata);
            }
            metadata.insert("durationMs".to_string(), Value::from(start.elapsed().as_millis() as u64));
            return ConversionResult::ok(metadata);
        }

        let Some((tool, soffice)) = self.locator.locate_any(CANDIDATES).await else {
            return ConversionResult::failed_with(
                DependencyStatus::missing("libreoffice", INSTALL_HINT).message,
                metadata,
            );
        };

        if let Err(e) = ensure_parent_dir(output).await {
            return ConversionResult::failed_with(
                format!("Failed to create output directory: {}", e),
                metadata,
            );
        }
        let out_dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let profile_dir = self
            .config
            .temp_dir
            .join(format!("lo_profile_{}", Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::create_dir_all(&profile_dir).await {
            return ConversionResult::failed_with(
                format!("Failed to create LibreOffice profile: {}", e),
                metadata,
            );
        }

        let args = build_args(input, &out_dir, &profile_dir);
        debug!(tool = %tool, path = %soffice.display(), ?args, "Running LibreOffice");

        let exec_options = ExecOptions::new(options.tool_timeout_or(self.config.tool_timeout()))
            .cancel_on(options.cancel.clone());
        let run = self.locator.executor().execute(&soffice, &args, &exec_options).await;

        if let Err(e) = tokio::fs::remove_dir_all(&profile_dir).await {
            warn!(path = %profile_dir.display(), error = %e, "Failed to remove LibreOffice profile");
        }

        let outcome = match run {
            Ok(outcome) => outcome,
            Err(e) => return ConversionResult::failed_with(format!("Conversion failed: {}", e), metadata),
        };
        if !outcome.success() {
            return ConversionResult::failed_with(
                format!("Conversion failed: {}", outcome.failure_reason("LibreOffice")),
                metadata,
            );
        }

        let generated = generated_path(input, &out_dir);
        if generated != output && tokio::fs::rename(&generated, output).await.is_err()
            && tokio::fs::metadata(output).await.is_err()
        {
            return ConversionResult::failed_with("PDF not generated", metadata);
        }

        let output_bytes = match tokio::fs::metadata(output).await {
            Ok(meta) => meta.len(),
            Err(_) => return ConversionResult::failed_with("PDF not generated", metadata),
        };
        metadata.insert("outputSize".to_string(), Value::from(output_bytes));
        metadata.insert("outputPath".to_string(), Value::from(output.display().to_string()));
        metadata.insert("durationMs".to_string(), Value::from(start.elapsed().as_millis() as u64));

        info!(input_bytes, output_bytes, "Document converted to PDF");
        ConversionResult::ok(metadata)
    }

    async fn check_dependencies(&self) -> DependencyStatus {
        let Some((tool, _)) = self.locator.locate_any(CANDIDATES).await else {
            return DependencyStatus::missing("libreoffice", INSTALL_HINT);
        };
        match self.locator.probe(&tool).await {
            Some(info) => DependencyStatus::found("libreoffice", info),
            None => DependencyStatus::missing("libreoffice", INSTALL_HINT),
        }
    }
}
