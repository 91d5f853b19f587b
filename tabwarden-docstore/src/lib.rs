//! # tabwarden-docstore
//!
//! Minimal client for one collection in a Firestore-style REST API.
//!
//! The Tabwarden worker reports the active tab into a single status document
//! and polls the same document for a remotely set action. Managers list every
//! status document of the collection and write actions back. This crate owns
//! the HTTP side of both exchanges.
//!
//! ## Design
//!
//! - Partial writes list every touched field in an update mask
//! - A worker patch that hits a missing document falls back to creating it
//! - A manager update of a missing document fails with `NotFound`
//! - Collection listings follow `nextPageToken` until exhausted
//! - No retries or backoff; callers queue failed writes themselves
//! - Values unknown to this crate are preserved on read
//!
//! ## Security
//!
//! The API key is a query parameter shipped with the worker's config. It is
//! kept out of `Debug` output and error messages but grants full access to
//! the document to anyone who copies it.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mask;
pub mod types;

pub use client::{CollectionStore, DocumentClient, DocumentStore};
pub use config::DocStoreConfig;
pub use error::{DocStoreError, Result};
pub use types::{Document, FieldValue, Fields};
