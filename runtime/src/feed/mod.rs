//! Feed services: the listing and metric operations callers invoke.
//!
//! Each service owns its cache and collaborators; the REST and CLI layers
//! only translate requests into calls here.

pub mod channel;
pub mod merger;
pub mod posts;
pub mod videos;
