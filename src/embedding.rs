//! Embedding generation via fastembed (behind the `embeddings` feature).

use anyhow::anyhow;

/// Embedding model wrapper around the default all-MiniLM-L6-v2.
pub struct EmbeddingModel {
    model: fastembed::TextEmbedding,
}

impl EmbeddingModel {
    /// Create a new embedding model with the default configuration.
    pub fn new() -> crate::Result<Self> {
        let model = fastembed::TextEmbedding::try_new(Default::default())
            .map_err(|e| anyhow!("failed to initialize embedding model: {e}"))?;

        Ok(Self { model })
    }

    /// Generate embeddings for multiple texts.
    pub fn embed(&self, texts: Vec<String>) -> crate::Result<Vec<Vec<f32>>> {
        self.model
            .embed(texts, None)
            .map_err(|e| anyhow!("embedding generation failed: {e}").into())
    }

    /// Generate an embedding for a single text.
    pub fn embed_one(&self, text: &str) -> crate::Result<Vec<f32>> {
        let mut embeddings = self.embed(vec![text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow!("embedding model returned no vector").into())
    }
}
