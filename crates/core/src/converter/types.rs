//! Types for the converter contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::process::ToolInfo;

/// Static description of a converter, as reported by the implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterInfo {
    /// Stable key, e.g. `json-to-csv`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Accepted input extensions, e.g. `.json`.
    pub supported_input_extensions: Vec<String>,
    /// Produced output types, e.g. `csv`.
    pub output_types: Vec<String>,
    /// External executables the converter shells out to.
    pub required_tools: Vec<String>,
}

impl ConverterInfo {
    /// Creates info for an in-process converter.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supported_input_extensions: Vec::new(),
            output_types: Vec::new(),
            required_tools: Vec::new(),
        }
    }

    /// Sets the accepted input extensions.
    pub fn inputs(mut self, extensions: &[&str]) -> Self {
        self.supported_input_extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    /// Sets the produced output types.
    pub fn outputs(mut self, types: &[&str]) -> Self {
        self.output_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Sets the required external tools.
    pub fn tools(mut self, tools: &[&str]) -> Self {
        self.required_tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Per-call options handed to [`Converter::convert`](super::Converter::convert).
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Skip external tools and write a placeholder output.
    pub dry_run: bool,
    /// Timeout for any external tool the converter spawns.
    pub tool_timeout: Option<Duration>,
    /// Cancelled when the attempt is abandoned; pass it to the executor.
    pub cancel: CancellationToken,
    /// Converter-specific parameters.
    pub params: Map<String, Value>,
}

impl ConvertOptions {
    /// Creates options carrying the given parameters.
    pub fn with_params(params: Map<String, Value>) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Returns a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Returns an unsigned integer parameter (numbers or numeric strings).
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Tool timeout, or `default` when the caller set none.
    pub fn tool_timeout_or(&self, default: Duration) -> Duration {
        self.tool_timeout.unwrap_or(default)
    }
}

/// The single result contract every converter honours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ConversionResult {
    /// A successful result with the given metadata.
    pub fn ok(metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            metadata,
        }
    }

    /// A failed result with a single error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::failed_with(error, Map::new())
    }

    /// A failed result that keeps the metadata gathered so far.
    pub fn failed_with(error: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            metadata,
        }
    }

    /// Errors joined into one message.
    pub fn error_message(&self) -> String {
        if self.errors.is_empty() {
            "converter reported failure without details".to_string()
        } else {
            self.errors.join("; ")
        }
    }
}

/// Whether a converter's external dependency is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub installed: bool,
    pub tool: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl DependencyStatus {
    /// Status for converters that need no external tool.
    pub fn builtin() -> Self {
        Self {
            installed: true,
            tool: "built-in".to_string(),
            message: "No external dependencies".to_string(),
            path: None,
            version: None,
        }
    }

    /// Status for a located tool.
    pub fn found(tool: impl Into<String>, info: ToolInfo) -> Self {
        let tool = tool.into();
        let message = match &info.version {
            Some(v) => format!("{} {} available at {}", tool, v, info.path.display()),
            None => format!("{} available at {}", tool, info.path.display()),
        };
        Self {
            installed: true,
            tool,
            message,
            path: Some(info.path),
            version: info.version,
        }
    }

    /// Status for a missing tool, with an install hint.
    pub fn missing(tool: impl Into<String>, hint: &str) -> Self {
        let tool = tool.into();
        Self {
            installed: false,
            message: format!("{} not found. Install: {}", tool, hint),
            tool,
            path: None,
            version: None,
        }
    }
}
