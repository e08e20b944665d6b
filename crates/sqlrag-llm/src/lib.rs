//! sqlrag-llm - Embedding and text generation clients
//!
//! This crate talks to an Ollama-compatible model server for both
//! embeddings and chat completions, and provides a deterministic offline
//! embedder for tests.
//!
//! # Features
//!
//! - `/api/embeddings` and `/api/chat` over a shared HTTP client
//! - Optional request timeout from configuration
//! - Token-hashing mock embedder with stable, comparable vectors

mod client;
mod mock;

pub use client::OllamaClient;
pub use mock::MockEmbedder;

// Re-export the capability traits for convenience
pub use sqlrag_core::{Embedder, TextGenerator};
