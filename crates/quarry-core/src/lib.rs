//! # Quarry Core
//!
//! Runtime-agnostic retrieval logic for Quarry: data models, chunking,
//! the store abstraction, vector and BM25 search, the hybrid
//! orchestrator, and prompt augmentation.
//!
//! This crate does no I/O of its own. Persistence and embedding
//! providers live behind the [`store::Store`] and
//! [`embedding::Embedder`] traits; the `quarry` application crate
//! supplies the SQLite and model-backed implementations.

pub mod augment;
pub mod bm25;
pub mod chunk;
pub mod citation;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod hybrid;
pub mod models;
pub mod rerank;
pub mod search;
pub mod store;

pub use error::{Error, Result};
