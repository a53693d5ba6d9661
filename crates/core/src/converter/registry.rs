//! Converter descriptors and the immutable registry built at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::support::{normalize_extension, normalize_output_type};
use super::traits::Converter;
use super::types::{ConversionResult, ConvertOptions, ConverterInfo, DependencyStatus};

/// A registered converter: normalized metadata plus its operations.
#[derive(Clone)]
pub struct ConverterDescriptor {
    info: ConverterInfo,
    converter: Arc<dyn Converter>,
}

impl ConverterDescriptor {
    /// Wraps a converter, normalizing the extensions and output types it reports.
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        let mut info = converter.info();
        info.supported_input_extensions = dedup(
            info.supported_input_extensions
                .iter()
                .map(|e| normalize_extension(e)),
        );
        info.output_types = dedup(info.output_types.iter().map(|t| normalize_output_type(t)));
        Self { info, converter }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &ConverterInfo {
        &self.info
    }

    pub fn supported_input_extensions(&self) -> &[String] {
        &self.info.supported_input_extensions
    }

    pub fn output_types(&self) -> &[String] {
        &self.info.output_types
    }

    pub fn required_tools(&self) -> &[String] {
        &self.info.required_tools
    }

    /// True if this converter accepts files with extension `ext`.
    pub fn accepts(&self, ext: &str) -> bool {
        let ext = normalize_extension(ext);
        self.info.supported_input_extensions.iter().any(|e| *e == ext)
    }

    /// True if this converter can produce `output_type`. `*` matches anything.
    pub fn produces(&self, output_type: &str) -> bool {
        let output_type = normalize_output_type(output_type);
        self.info
            .output_types
            .iter()
            .any(|t| t == "*" || *t == output_type)
    }

    /// Runs the converter.
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> ConversionResult {
        self.converter.convert(input, output, options).await
    }

    /// Checks the converter's external dependencies.
    pub async fn check_dependencies(&self) -> DependencyStatus {
        self.converter.check_dependencies().await
    }
}

impl fmt::Debug for ConverterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterDescriptor")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && item != "." && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Collects descriptors before the registry is frozen.
#[derive(Debug, Default)]
pub struct ConverterRegistryBuilder {
    converters: BTreeMap<String, Arc<ConverterDescriptor>>,
}

impl ConverterRegistryBuilder {
    /// Registers a descriptor. A duplicate id replaces the earlier one.
    pub fn register(&mut self, descriptor: ConverterDescriptor) -> &mut Self {
        let id = descriptor.id().to_string();
        if let Some(previous) = self.converters.insert(id.clone(), Arc::new(descriptor)) {
            warn!(
                converter = %id,
                replaced = %previous.name(),
                "Duplicate converter id registered, last registration wins"
            );
        }
        self
    }

    /// Wraps and registers a converter implementation.
    pub fn register_converter(&mut self, converter: Arc<dyn Converter>) -> &mut Self {
        self.register(ConverterDescriptor::new(converter))
    }

    /// Freezes the registry.
    pub fn build(self) -> ConverterRegistry {
        info!(count = self.converters.len(), "Converter registry built");
        ConverterRegistry {
            converters: self.converters,
        }
    }
}

/// Read-only map of converters, built once and shared by reference.
///
/// Lookups are independent of registration order: when several converters
/// match, the one with the smallest id wins.
#[derive(Debug, Default, Clone)]
pub struct ConverterRegistry {
    converters: BTreeMap<String, Arc<ConverterDescriptor>>,
}

impl ConverterRegistry {
    /// Starts building a registry.
    pub fn builder() -> ConverterRegistryBuilder {
        ConverterRegistryBuilder::default()
    }

    /// Looks up a converter by id.
    pub fn get(&self, id: &str) -> Option<Arc<ConverterDescriptor>> {
        self.converters.get(id).cloned()
    }

    /// Finds a converter accepting extension `ext` (with or without the dot).
    pub fn find_by_extension(&self, ext: &str) -> Option<Arc<ConverterDescriptor>> {
        self.converters.values().find(|d| d.accepts(ext)).cloned()
    }

    /// Finds a converter for `input_ext`, preferring one that produces `output_type`.
    pub fn find_for(
        &self,
        input_ext: &str,
        output_type: Option<&str>,
    ) -> Option<Arc<ConverterDescriptor>> {
        if let Some(output_type) = output_type {
            let exact = self
                .converters
                .values()
                .find(|d| d.accepts(input_ext) && d.produces(output_type));
            if let Some(found) = exact {
                return Some(Arc::clone(found));
            }
        }
        self.find_by_extension(input_ext)
    }

    /// All converters, ordered by id.
    pub fn all(&self) -> Vec<Arc<ConverterDescriptor>> {
        self.converters.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
