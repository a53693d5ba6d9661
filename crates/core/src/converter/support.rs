//! Helpers shared by the built-in converters and the registry.

use serde_json::{Map, Value};
use std::any::Any;
use std::path::Path;

/// Lowercases an extension and makes sure it has a leading dot.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Lowercases an output type and strips any leading dot.
pub fn normalize_output_type(output_type: &str) -> String {
    output_type.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Normalized extension of `path`, e.g. `.docx`.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(normalize_extension)
}

/// Size of the input file, or a user-facing error.
pub(crate) async fn input_size(path: &Path) -> Result<u64, String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(format!("{} is not a file", path.display())),
        Err(_) => Err(format!("File not found: {}", path.display())),
    }
}

/// Fails unless `path` has one of the accepted extensions.
pub(crate) fn ensure_extension(path: &Path, accepted: &[&str]) -> Result<String, String> {
    let ext = extension_of(path).unwrap_or_default();
    if accepted.iter().any(|a| normalize_extension(a) == ext) {
        Ok(ext)
    } else {
        Err(format!("Unsupported format: {}", if ext.is_empty() { "<none>" } else { ext.as_str() }))
    }
}

/// Creates the parent directory of `output`.
pub(crate) async fn ensure_parent_dir(output: &Path) -> std::io::Result<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Writes the dry-run placeholder and records it in `metadata`.
pub(crate) async fn write_placeholder(
    output: &Path,
    contents: &[u8],
    metadata: &mut Map<String, Value>,
) -> std::io::Result<()> {
    ensure_parent_dir(output).await?;
    tokio::fs::write(output, contents).await?;
    metadata.insert("dryRun".to_string(), Value::Bool(true));
    metadata.insert(
        "outputPath".to_string(),
        Value::String(output.display().to_string()),
    );
    metadata.insert("outputSize".to_string(), Value::from(contents.len() as u64));
    Ok(())
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("JSON"), ".json");
        assert_eq!(normalize_extension(".Docx"), ".docx");
        assert_eq!(normalize_extension(" pdf "), ".pdf");
    }

    #[test]
    fn test_normalize_output_type() {
        assert_eq!(normalize_output_type(".PDF"), "pdf");
        assert_eq!(normalize_output_type("csv"), "csv");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(
            extension_of(&PathBuf::from("/tmp/Report.DOCX")),
            Some(".docx".to_string())
        );
        assert_eq!(extension_of(&PathBuf::from("/tmp/Makefile")), None);
    }

    #[test]
    fn test_ensure_extension() {
        let accepted = [".docx", ".odt"];
        assert_eq!(
            ensure_extension(Path::new("a.ODT"), &accepted),
            Ok(".odt".to_string())
        );
        assert_eq!(
            ensure_extension(Path::new("a.txt"), &accepted),
            Err("Unsupported format: .txt".to_string())
        );
        assert_eq!(
            ensure_extension(Path::new("noext"), &accepted),
            Err("Unsupported format: <none>".to_string())
        );
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let formatted = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "code 7");
    }

    #[tokio::test]
    async fn test_write_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("out.pdf");
        let mut metadata = Map::new();

        write_placeholder(&output, b"DRY", &mut metadata).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"DRY");
        assert_eq!(metadata["dryRun"], true);
        assert_eq!(metadata["outputSize"], 3);
    }

    #[tokio::test]
    async fn test_input_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.json");
        std::fs::write(&file, b"[]").unwrap();

        assert_eq!(input_size(&file).await, Ok(2));
        assert!(input_size(dir.path()).await.unwrap_err().contains("is not a file"));
        assert!(input_size(&dir.path().join("missing"))
            .await
            .unwrap_err()
            .starts_with("File not found"));
    }
}
