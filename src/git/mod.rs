pub mod parser;
pub mod repo;

pub use parser::{CommitStream, FIELD_SEP, LOG_FORMAT};
pub use repo::{resolve_range, GitRepo, History};
