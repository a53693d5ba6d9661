//! Output naming for jobs submitted without an explicit destination.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use docforge_core::{converter::extension_of, ConverterRegistry};

/// Extension of the converter's first output type, or `out` when unknown.
pub fn output_extension(registry: &ConverterRegistry, input: &Path, converter: Option<&str>) -> String {
    let descriptor = match converter {
        Some(id) => registry.get(id),
        None => extension_of(input).and_then(|ext| registry.find_by_extension(&ext)),
    };
    descriptor
        .and_then(|d| d.output_types().first().cloned())
        .filter(|t| t != "*")
        .unwrap_or_else(|| "out".to_string())
}

/// `<dir>/<sanitized stem>_<timestamp>.<ext>`
pub fn default_output_path(dir: &Path, input: &Path, ext: &str, now: DateTime<Utc>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| sanitize_stem(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    dir.join(format!("{}_{}.{}", stem, now.format("%Y%m%d%H%M%S"), ext))
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use docforge_core::{builtin_registry, ConverterConfig, ProcessExecutor, ToolLocator};
    use std::collections::HashMap;

    fn registry() -> ConverterRegistry {
        let locator = ToolLocator::new(ProcessExecutor::default(), HashMap::new());
        builtin_registry(&ConverterConfig::default(), locator).unwrap()
    }

    #[test]
    fn test_default_output_path() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let path = default_output_path(Path::new("out"), Path::new("/tmp/My Report (v2).docx"), "pdf", now);
        assert_eq!(path, PathBuf::from("out/My_Report__v2__20240305140709.pdf"));
    }

    #[test]
    fn test_output_extension() {
        let registry = registry();
        assert_eq!(output_extension(&registry, Path::new("a.json"), None), "csv");
        assert_eq!(output_extension(&registry, Path::new("a.docx"), None), "pdf");
        assert_eq!(output_extension(&registry, Path::new("a.mpp"), None), "xml");
        assert_eq!(
            output_extension(&registry, Path::new("a.bin"), Some("video-to-mp4")),
            "mp4"
        );
        assert_eq!(output_extension(&registry, Path::new("a.xyz"), None), "out");
    }
}
