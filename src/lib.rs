pub mod config;
pub mod errors;
pub mod executor;
pub mod ocr;
pub mod perception;
pub mod query;

pub use config::AppConfig;
pub use errors::{VisionDomError, VisionDomResult};
pub use executor::{ExecutorContext, InteractionExecutor};
pub use perception::pipeline::{EnrichmentProbe, InspectOptions, InspectionPipeline};
pub use perception::types::{BoundingBox, ElementRecord, Point};
pub use query::ElementSet;

/// Install the fmt subscriber. `RUST_LOG` wins; otherwise `default_directive`
/// (e.g. `"info"`) applies. Calling it twice is harmless.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
