//! Converters and the registry that describes them.
//!
//! Every converter implements [`Converter`] and reports its outcome as a
//! [`ConversionResult`]. Converters are registered once at startup into an
//! immutable [`ConverterRegistry`]; modules written in the older single
//! `convert*` method shape go through [`adapt_legacy`] first.
//!
//! # Example
//!
//! ```ignore
//! use docforge_core::converter::{builtin_registry, ConvertOptions, ConverterConfig};
//! use docforge_core::process::{ProcessExecutor, ToolLocator};
//!
//! let config = ConverterConfig::default();
//! let locator = ToolLocator::new(ProcessExecutor::default(), config.tool_paths.clone());
//! let registry = builtin_registry(&config, locator)?;
//!
//! let converter = registry.find_by_extension(".json").unwrap();
//! let result = converter
//!     .convert(Path::new("data.json"), Path::new("data.csv"), &ConvertOptions::default())
//!     .await;
//! assert!(result.success);
//! ```

mod builtin;
mod config;
pub mod csv_to_json;
pub mod docx_to_pdf;
pub mod json_to_csv;
mod legacy;
pub mod mpp_to_xml;
mod registry;
mod support;
mod traits;
mod types;
pub mod video_to_mp4;

pub use builtin::builtin_registry;
pub use config::ConverterConfig;
pub use docx_to_pdf::DocxToPdfConverter;
pub use json_to_csv::JsonToCsvConverter;
pub use legacy::{adapt_legacy, kebab_case, normalize_legacy_value, LegacyError, LegacyModule};
pub use mpp_to_xml::MppToXmlConverter;
pub use registry::{ConverterDescriptor, ConverterRegistry, ConverterRegistryBuilder};
pub use support::{extension_of, normalize_extension, normalize_output_type, panic_message};
pub use traits::Converter;
pub use types::{ConversionResult, ConvertOptions, ConverterInfo, DependencyStatus};
pub use video_to_mp4::{VideoQuality, VideoSettings, VideoToMp4Converter};
