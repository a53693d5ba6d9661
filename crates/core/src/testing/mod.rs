//! Testing utilities for exercising the orchestrator without external tools.
//!
//! # Example
//!
//! ```rust,ignore
//! use docforge_core::testing::{fixtures, ScriptedConverter, Step};
//!
//! let converter = ScriptedConverter::new("flaky", &[".txt"])
//!     .with_script(vec![Step::Fail("boom".into()), Step::Succeed(b"ok".to_vec())]);
//! let registry = fixtures::registry(&[&converter]);
//! let orchestrator = ConversionOrchestrator::new(registry, repository, fixtures::fast_config());
//! ```

mod scripted_converter;

pub use scripted_converter::{RecordedCall, ScriptedConverter, Step};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use super::ScriptedConverter;
    use crate::converter::ConverterRegistry;
    use crate::orchestrator::{OrchestratorConfig, RetryConfig};

    /// Registry holding the given scripted converters.
    pub fn registry(converters: &[&ScriptedConverter]) -> Arc<ConverterRegistry> {
        let mut builder = ConverterRegistry::builder();
        for converter in converters {
            builder.register(converter.descriptor());
        }
        Arc::new(builder.build())
    }

    /// Orchestrator config with no backoff delay and short deadlines.
    pub fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_cleanup_grace(Duration::from_millis(200))
            .with_retry(RetryConfig::default().with_delays(Duration::ZERO, Duration::ZERO))
    }

    /// Writes `contents` to `dir/name` and returns the path.
    pub async fn write_input(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Err(e) = tokio::fs::write(&path, contents).await {
            panic!("failed to write fixture {}: {}", path.display(), e);
        }
        path
    }
}
