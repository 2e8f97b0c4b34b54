pub mod auth;
pub mod posts;
pub mod slug;
pub mod tags;
pub mod transliterate;

use thiserror::Error;

/// Input rejected by a service; surfaced to clients as a bad request.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);
