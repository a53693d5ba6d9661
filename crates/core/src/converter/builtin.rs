//! Registration of the converters shipped with the crate.

use std::sync::Arc;

use super::config::ConverterConfig;
use super::csv_to_json;
use super::docx_to_pdf::DocxToPdfConverter;
use super::json_to_csv::JsonToCsvConverter;
use super::legacy::{adapt_legacy, LegacyError};
use super::mpp_to_xml::MppToXmlConverter;
use super::registry::ConverterRegistry;
use super::video_to_mp4::VideoToMp4Converter;
use crate::process::ToolLocator;

/// Builds the registry of built-in converters.
pub fn builtin_registry(
    config: &ConverterConfig,
    locator: ToolLocator,
) -> Result<ConverterRegistry, LegacyError> {
    let mut builder = ConverterRegistry::builder();
    builder
        .register_converter(Arc::new(JsonToCsvConverter::new()))
        .register_converter(Arc::new(MppToXmlConverter::new()))
        .register_converter(Arc::new(DocxToPdfConverter::new(
            config.clone(),
            locator.clone(),
        )))
        .register_converter(Arc::new(VideoToMp4Converter::new(config.clone(), locator)))
        .register(adapt_legacy(csv_to_json::module())?);
    Ok(builder.build())
}
