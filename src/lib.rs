pub mod cli;
pub mod error;
pub mod git;
pub mod ingest;
pub mod model;
pub mod query;
pub mod render;
pub mod store;
pub mod util;

pub use error::{RepoVisError, Result};
pub use query::QueryService;
pub use store::Store;
