pub mod accumulator;
pub mod build;
pub mod pipeline;
pub mod reconcile;
pub mod resolver;

pub use accumulator::{MetricKey, MetricsAccumulator};
pub use build::{build_store, ensure_store, BuildOutcome, BuildReport};
pub use pipeline::{IngestOptions, IngestSummary, Ingestor, DEFAULT_BATCH_SIZE};
pub use reconcile::reconcile;
pub use resolver::{ContributorResolver, PathResolver};
