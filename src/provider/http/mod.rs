//! HTTP plumbing for the upstream API.

mod client;

pub use client::{HttpClient, RawResponse, header_map};
