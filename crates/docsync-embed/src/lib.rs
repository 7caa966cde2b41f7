//! Embedders for the document store.
//!
//! - [`HashEmbedder`]: deterministic bag-of-tokens hashing, no model needed.
//! - [`OpenAiEmbedder`]: OpenAI-compatible `POST /v1/embeddings` with retry.
//!
//! [`get_default_embedder`] picks one from [`EmbeddingConfig`];
//! `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder.

mod hash;
mod openai;

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

use docsync_core::config::EmbeddingConfig;
use docsync_core::traits::Embedder;

pub const DEFAULT_HASH_DIM: usize = 1024;

pub fn get_default_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if use_fake {
        info!("Using HashEmbedder (APP_USE_FAKE_EMBEDDINGS)");
        return Ok(Arc::new(HashEmbedder::new(config.dims.unwrap_or(DEFAULT_HASH_DIM))));
    }
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims.unwrap_or(DEFAULT_HASH_DIM)))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
