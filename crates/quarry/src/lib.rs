//! # Quarry
//!
//! A local-first retrieval-augmented generation toolkit: ingest
//! documents into SQLite, search them with hybrid vector + BM25
//! retrieval, group them into knowledge bases, and fold retrieved
//! context into model prompts.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ txt/md/pdf/  │──▶│ Chunk+Embed  │──▶│  SQLite  │
//! │ docx files   │   │  (ingest)    │   │          │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                              ┌─────────────┴───┐
//!                              ▼                 ▼
//!                        ┌──────────┐     ┌───────────┐
//!                        │  search  │     │  augment  │
//!                        │ (hybrid) │     │ (prompts) │
//!                        └──────────┘     └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite storage backend |
//! | [`embedding`] | Embedding providers (OpenAI, local, disabled) |
//! | [`extract`] | Text extraction for txt, md, pdf, docx |
//! | [`service`] | Ingestion, search, and knowledge-base operations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod migrate;
pub mod service;
pub mod sqlite_store;
