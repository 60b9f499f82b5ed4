use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepoVisError>;

#[derive(Error, Debug)]
pub enum RepoVisError {
    #[error("Git error: {0}")]
    Git(#[from] Box<gix::open::Error>),
    #[error("Git repository error: {0}")]
    GitRepo(String),
    #[error("Git history read failed: {0}")]
    History(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Store not found at {}; build it first", .0.display())]
    StoreMissing(PathBuf),
    #[error("Node {0} not found")]
    NotFound(i64),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Reference find error: {0}")]
    RefFind(#[from] Box<gix::reference::find::existing::Error>),
    #[error("Head peel error: {0}")]
    HeadPeel(#[from] Box<gix::head::peel::to_commit::Error>),
    #[error("Tree traversal error: {0}")]
    Traverse(#[from] Box<gix::traverse::tree::breadthfirst::Error>),
    #[error("Git discover error: {0}")]
    GitDiscover(#[from] Box<gix::discover::Error>),
}

impl RepoVisError {
    /// Failures caused by the caller's input rather than by the store or repository.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RepoVisError::NotFound(_)
                | RepoVisError::InvalidParameter(_)
                | RepoVisError::InvalidDate(_)
        )
    }
}

// Manual From implementations for unboxed to boxed conversions
impl From<gix::open::Error> for RepoVisError {
    fn from(err: gix::open::Error) -> Self {
        RepoVisError::Git(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for RepoVisError {
    fn from(err: gix::object::commit::Error) -> Self {
        RepoVisError::Commit(Box::new(err))
    }
}

impl From<gix::reference::find::existing::Error> for RepoVisError {
    fn from(err: gix::reference::find::existing::Error) -> Self {
        RepoVisError::RefFind(Box::new(err))
    }
}

impl From<gix::head::peel::to_commit::Error> for RepoVisError {
    fn from(err: gix::head::peel::to_commit::Error) -> Self {
        RepoVisError::HeadPeel(Box::new(err))
    }
}

impl From<gix::traverse::tree::breadthfirst::Error> for RepoVisError {
    fn from(err: gix::traverse::tree::breadthfirst::Error) -> Self {
        RepoVisError::Traverse(Box::new(err))
    }
}

impl From<gix::discover::Error> for RepoVisError {
    fn from(err: gix::discover::Error) -> Self {
        RepoVisError::GitDiscover(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(RepoVisError::NotFound(7).is_client_error());
        assert!(RepoVisError::InvalidParameter("x".into()).is_client_error());
        assert!(!RepoVisError::StoreMissing(PathBuf::from("/nope.db")).is_client_error());
        assert!(!RepoVisError::Store("boom".into()).is_client_error());
    }
}
