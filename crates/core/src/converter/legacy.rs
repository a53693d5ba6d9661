//! Adapter for converters written against the older calling convention.
//!
//! Legacy modules expose one arbitrarily named `convert*` method that takes
//! `(input, output, options)` and returns any JSON value. [`adapt_legacy`]
//! wraps such a module once, at registration time, into a regular
//! [`ConverterDescriptor`]: the id is derived from the module name, the
//! return value is coerced into a [`ConversionResult`], and errors or panics
//! raised by the method become failed results.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::registry::ConverterDescriptor;
use super::support::panic_message;
use super::traits::Converter;
use super::types::{ConversionResult, ConvertOptions, ConverterInfo, DependencyStatus};

type LegacyMethod = Arc<
    dyn Fn(PathBuf, PathBuf, Map<String, Value>) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

type LegacyDependencyCheck = Arc<dyn Fn() -> BoxFuture<'static, DependencyStatus> + Send + Sync>;

/// Errors raised while adapting a legacy module.
#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("legacy module has an empty name")]
    EmptyName,

    #[error("legacy module {module} exposes no convert method")]
    NoConvertMethod { module: String },
}

/// A converter in the legacy shape, assembled with builder calls.
#[derive(Clone)]
pub struct LegacyModule {
    name: String,
    description: Option<String>,
    methods: Vec<(String, LegacyMethod)>,
    supported_extensions: Vec<String>,
    output_types: Vec<String>,
    required_tools: Vec<String>,
    dependency_check: Option<LegacyDependencyCheck>,
}

impl LegacyModule {
    /// Starts a module named like its source file, e.g. `csvToJson`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            methods: Vec::new(),
            supported_extensions: Vec::new(),
            output_types: Vec::new(),
            required_tools: Vec::new(),
            dependency_check: None,
        }
    }

    /// Adds a method. Only methods named `convert*` are used for conversion.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(PathBuf, PathBuf, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let method: LegacyMethod =
            Arc::new(move |input: PathBuf, output: PathBuf, options: Map<String, Value>| {
                f(input, output, options).boxed()
            });
        self.methods.push((name.into(), method));
        self
    }

    pub fn supported_extensions(mut self, extensions: &[&str]) -> Self {
        self.supported_extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn output_types(mut self, types: &[&str]) -> Self {
        self.output_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn required_tools(mut self, tools: &[&str]) -> Self {
        self.required_tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Supplies the module's own dependency check.
    pub fn dependency_check<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DependencyStatus> + Send + 'static,
    {
        let check: LegacyDependencyCheck = Arc::new(move || f().boxed());
        self.dependency_check = Some(check);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LegacyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("LegacyModule")
            .field("name", &self.name)
            .field("methods", &methods)
            .field("supported_extensions", &self.supported_extensions)
            .finish_non_exhaustive()
    }
}

/// Converts a camelCase module name into a kebab-case id.
///
/// `csvToJson` becomes `csv-to-json`. Underscores and spaces also become
/// dashes; leading, trailing and repeated dashes are dropped.
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.trim().chars() {
        if c.is_uppercase() {
            out.push('-');
            out.extend(c.to_lowercase());
        } else if matches!(c, '_' | ' ' | '-') {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out.split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Coerces an arbitrary legacy return value into a [`ConversionResult`].
///
/// Objects are read as `{success, errors, metadata}` with a missing
/// `success` meaning true and a missing `metadata` meaning the whole object.
/// Any other value ends up under `metadata.result`. Normalizing an already
/// normalized result yields the same result.
pub fn normalize_legacy_value(value: Value) -> ConversionResult {
    match value {
        Value::Object(mut object) => {
            let success = !matches!(object.get("success"), Some(Value::Bool(false)));
            let errors = match object.get("errors") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                Some(Value::String(s)) => vec![s.clone()],
                _ => Vec::new(),
            };
            let metadata = match object.remove("metadata") {
                Some(Value::Object(metadata)) => metadata,
                Some(other) => {
                    object.insert("metadata".to_string(), other);
                    object
                }
                None => object,
            };
            ConversionResult {
                success,
                errors,
                metadata,
            }
        }
        other => {
            let mut metadata = Map::new();
            metadata.insert("result".to_string(), other);
            ConversionResult::ok(metadata)
        }
    }
}

/// Wraps a legacy module into a descriptor.
///
/// The first method whose name starts with `convert` is used. Modules
/// without one are rejected.
pub fn adapt_legacy(module: LegacyModule) -> Result<ConverterDescriptor, LegacyError> {
    let id = kebab_case(&module.name);
    if id.is_empty() {
        return Err(LegacyError::EmptyName);
    }
    let (method_name, method) = module
        .methods
        .iter()
        .find(|(name, _)| name.starts_with("convert"))
        .cloned()
        .ok_or_else(|| LegacyError::NoConvertMethod {
            module: module.name.clone(),
        })?;

    let info = ConverterInfo {
        id,
        name: module.name.clone(),
        supported_input_extensions: module.supported_extensions.clone(),
        output_types: if module.output_types.is_empty() {
            vec!["*".to_string()]
        } else {
            module.output_types.clone()
        },
        required_tools: module.required_tools.clone(),
    };

    Ok(ConverterDescriptor::new(Arc::new(LegacyConverter {
        info,
        description: module
            .description
            .unwrap_or_else(|| format!("Converter: {}", module.name)),
        method_name,
        method,
        dependency_check: module.dependency_check,
    })))
}

struct LegacyConverter {
    info: ConverterInfo,
    description: String,
    method_name: String,
    method: LegacyMethod,
    dependency_check: Option<LegacyDependencyCheck>,
}

#[async_trait]
impl Converter for LegacyConverter {
    fn info(&self) -> ConverterInfo {
        self.info.clone()
    }

    async fn convert(&self, input: &Path, output: &Path, options: &ConvertOptions) -> ConversionResult {
        let mut legacy_options = options.params.clone();
        legacy_options.insert("dryRun".to_string(), Value::Bool(options.dry_run));

        let call = std::panic::catch_unwind(AssertUnwindSafe(|| {
            (self.method)(input.to_path_buf(), output.to_path_buf(), legacy_options)
        }));
        let future = match call {
            Ok(future) => future,
            Err(payload) => return self.panicked(panic_message(payload.as_ref())),
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => normalize_legacy_value(value),
            Ok(Err(err)) => ConversionResult::failed(err.to_string()),
            Err(payload) => self.panicked(panic_message(payload.as_ref())),
        }
    }

    async fn check_dependencies(&self) -> DependencyStatus {
        match &self.dependency_check {
            Some(check) => check().await,
            None => DependencyStatus::builtin(),
        }
    }
}

impl LegacyConverter {
    fn panicked(&self, message: String) -> ConversionResult {
        warn!(
            converter = %self.info.id,
            method = %self.method_name,
            description = %self.description,
            "Legacy convert method panicked: {}",
            message
        );
        ConversionResult::failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("csvToJson"), "csv-to-json");
        assert_eq!(kebab_case("excelToCsv"), "excel-to-csv");
        assert_eq!(kebab_case("DocxToPdf"), "docx-to-pdf");
        assert_eq!(kebab_case("video_to mp4"), "video-to-mp4");
        assert_eq!(kebab_case("already-kebab"), "already-kebab");
        assert_eq!(kebab_case(""), "");
    }

    #[test]
    fn test_normalize_plain_object() {
        let result = normalize_legacy_value(json!({"rows": 3, "outputPath": "/tmp/x"}));
        assert!(result.success);
        assert!(result.errors.is_empty());
        assert_eq!(result.metadata, object(json!({"rows": 3, "outputPath": "/tmp/x"})));
    }

    #[test]
    fn test_normalize_explicit_failure() {
        let result = normalize_legacy_value(json!({"success": false, "errors": ["bad", 7]}));
        assert!(!result.success);
        assert_eq!(result.errors, vec!["bad", "7"]);

        let result = normalize_legacy_value(json!({"success": false, "errors": "broken"}));
        assert_eq!(result.errors, vec!["broken"]);
    }

    #[test]
    fn test_normalize_uses_metadata_key() {
        let result = normalize_legacy_value(json!({"success": true, "metadata": {"pages": 2}}));
        assert_eq!(result.metadata, object(json!({"pages": 2})));
    }

    #[test]
    fn test_normalize_scalars() {
        let result = normalize_legacy_value(json!("done"));
        assert!(result.success);
        assert_eq!(result.metadata, object(json!({"result": "done"})));

        let result = normalize_legacy_value(json!([1, 2]));
        assert_eq!(result.metadata, object(json!({"result": [1, 2]})));

        let result = normalize_legacy_value(Value::Null);
        assert!(result.success);
        assert_eq!(result.metadata, object(json!({"result": null})));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let values = [
            json!({"rows": 3}),
            json!({"success": false, "errors": ["x"]}),
            json!({"success": true, "metadata": {"a": 1}}),
            json!(42),
            Value::Null,
        ];
        for value in values {
            let once = normalize_legacy_value(value);
            let twice = normalize_legacy_value(serde_json::to_value(&once).unwrap());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_adapt_requires_convert_method() {
        let module = LegacyModule::new("helperModule").method("parse", |_, _, _| async { Ok::<_, anyhow::Error>(Value::Null) });
        let err = adapt_legacy(module).unwrap_err();
        assert!(matches!(err, LegacyError::NoConvertMethod { .. }));

        assert!(matches!(
            adapt_legacy(LegacyModule::new("  ")).unwrap_err(),
            LegacyError::EmptyName
        ));
    }

    #[tokio::test]
    async fn test_adapted_module_contract() {
        let module = LegacyModule::new("fooToBar")
            .supported_extensions(&[".FOO"])
            .method("helper", |_, _, _| async {
                Err::<Value, _>(anyhow::anyhow!("should not be called"))
            })
            .method("convertFooToBar", |input: PathBuf, _, _| async move {
                Ok::<_, anyhow::Error>(json!({"input": input.display().to_string()}))
            });
        let descriptor = adapt_legacy(module).unwrap();

        assert_eq!(descriptor.id(), "foo-to-bar");
        assert!(descriptor.accepts(".foo"));
        assert!(descriptor.produces("anything"));

        let result = descriptor
            .convert(Path::new("in.foo"), Path::new("out.bar"), &ConvertOptions::default())
            .await;
        assert_eq!(
            result,
            ConversionResult::ok(object(json!({"input": "in.foo"})))
        );

        let deps = descriptor.check_dependencies().await;
        assert!(deps.installed);
        assert_eq!(deps.tool, "built-in");
        assert_eq!(deps.message, "No external dependencies");
    }

    #[tokio::test]
    async fn test_adapted_module_errors_become_results() {
        let failing = adapt_legacy(
            LegacyModule::new("boom").method("convertBoom", |_, _, _| async {
                Err::<Value, _>(anyhow::anyhow!("disk on fire"))
            }),
        )
        .unwrap();
        let result = failing
            .convert(Path::new("a"), Path::new("b"), &ConvertOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.errors, vec!["disk on fire"]);
        assert!(result.metadata.is_empty());

        let panicking = adapt_legacy(LegacyModule::new("panicky").method(
            "convertPanicky",
            |_, _, _| async {
                if true {
                    panic!("legacy panic");
                }
                Ok::<_, anyhow::Error>(Value::Null)
            },
        ))
        .unwrap();
        let result = panicking
            .convert(Path::new("a"), Path::new("b"), &ConvertOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.errors, vec!["legacy panic"]);
    }

    #[tokio::test]
    async fn test_custom_dependency_check() {
        let descriptor = adapt_legacy(
            LegacyModule::new("needsTool")
                .method("convertIt", |_, _, _| async { Ok::<_, anyhow::Error>(Value::Null) })
                .dependency_check(|| async { DependencyStatus::missing("tool", "install tool") }),
        )
        .unwrap();
        assert!(!descriptor.check_dependencies().await.installed);
    }
}
