//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::types::{ConversionResult, ConvertOptions, ConverterInfo, DependencyStatus};

/// A unit that turns one file format into another.
///
/// Implementations never panic or return early with an error type: every
/// outcome is a [`ConversionResult`]. Tool-backed converters must pass
/// `options.cancel` to the process executor so an abandoned attempt kills
/// its child process.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Describes the converter.
    fn info(&self) -> ConverterInfo;

    /// Converts `input` into `output`.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> ConversionResult;

    /// Reports whether required external tools are installed.
    async fn check_dependencies(&self) -> DependencyStatus {
        DependencyStatus::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    struct EchoConverter;

    #[async_trait]
    impl Converter for EchoConverter {
        fn info(&self) -> ConverterInfo {
            ConverterInfo::new("echo", "Echo")
                .inputs(&[".txt"])
                .outputs(&["txt"])
        }

        async fn convert(
            &self,
            input: &Path,
            output: &Path,
            _options: &ConvertOptions,
        ) -> ConversionResult {
            match tokio::fs::copy(input, output).await {
                Ok(bytes) => {
                    let mut metadata = Map::new();
                    metadata.insert("outputSize".to_string(), bytes.into());
                    ConversionResult::ok(metadata)
                }
                Err(e) => ConversionResult::failed(e.to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_default_dependency_check_is_builtin() {
        let status = EchoConverter.check_dependencies().await;
        assert!(status.installed);
        assert_eq!(status.tool, "built-in");
    }

    #[tokio::test]
    async fn test_convert_through_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, b"hello").unwrap();

        let converter: Box<dyn Converter> = Box::new(EchoConverter);
        let result = converter
            .convert(&input, &output, &ConvertOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.metadata["outputSize"], 5);
        assert_eq!(std::fs::read(&output).unwrap(), b"hello");
    }
}
