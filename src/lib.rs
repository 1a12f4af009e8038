//! Conversational engine for a health-metrics assistant.
//!
//! VitalChat keeps any number of chat sessions, optionally filed into flat
//! folders, answers questions through a local inference service, and grounds
//! those answers in a small curated knowledge base:
//!
//! | Component | Role |
//! |-----------|------|
//! | [`chat::SessionStore`] | Sessions, folders, auto-titling, recency grouping |
//! | [`knowledge::KnowledgeStore`] | Curated entries with CRUD and JSON import/export |
//! | [`knowledge::search`] | Lexical scoring of entries against a question |
//! | [`chat::PromptComposer`] | System persona, context splicing, off-topic gate |
//! | [`model::ModelOrchestrator`] | Model discovery, selection, requests, error classes |
//! | [`chat::ChatEngine`] | The send pipeline tying all of the above together |
//!
//! # Architecture
//!
//! - **Storage**: a string-keyed get/set port ([`storage::StoragePort`]) with an
//!   in-memory adapter and a SQLite adapter
//! - **Retrieval**: keyword scoring (title, category, content frequency), no embeddings
//! - **Inference**: an Ollama-compatible HTTP service, non-streaming
//! - **Failure policy**: an unreachable or misbehaving backend becomes an
//!   assistant message in the transcript, never an error to the caller
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`error`] — Engine, storage, and backend error types
//! - [`storage`] — Key-value persistence port and adapters
//! - [`knowledge`] — Knowledge entries, their store, and retrieval
//! - [`chat`] — Sessions, folders, prompt composition, and the send pipeline
//! - [`model`] — Inference backend transport and model orchestration
//! - [`server`] — HTTP API over a shared engine

pub mod chat;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod model;
pub mod server;
pub mod storage;
