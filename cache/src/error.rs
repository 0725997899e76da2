use thiserror::Error;

/// Errors surfaced by the cache's merge and registry operations.
///
/// Permission recomputation never produces one of these: a dangling role,
/// member or server reference is skipped, not reported.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("value is locked; raw value can no longer be set")]
    Locked,
    #[error("{kind} {key} is already cached")]
    DuplicateEntity { kind: &'static str, key: String },
    #[error("{kind} {id} belongs to server {expected}, payload names {found}")]
    ServerMismatch {
        kind: &'static str,
        id: String,
        expected: String,
        found: String,
    },
    #[error("server {0} is not cached")]
    UnknownServer(String),
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
