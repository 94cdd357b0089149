#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Alt text generation for image libraries.
//!
//! Images lacking alt text are described by remote vision models served through
//! `OpenRouter`. Suggestions are stored for review (pending → applied/rejected)
//! or applied immediately in `auto` mode.
//!
//! ```text
//!  scan ──► generate_for_image ──► Generator ──► ModelCatalog ──► VisionApi
//!    │                                 │              │
//!    ▼                                 ▼              ▼
//!  RunLock                     ExhaustionTracker   StateStore
//! ```

pub mod catalog;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod exhaustion;
pub mod generate;
pub mod media;
pub mod provider;
pub mod service;
pub mod state;
pub mod store;
pub mod suggestion;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
