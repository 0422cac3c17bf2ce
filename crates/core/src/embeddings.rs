use crate::StoreError;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// Embedding function used for both indexing and querying.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Deterministic feature-hashing embedder over word tokens and character trigrams.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    fn bucket(&self, feature: &str) -> usize {
        let mut hash = 1469598103934665603u64;
        for byte in feature.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        (hash % self.dimensions as u64) as usize
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        if self.dimensions == 0 {
            return Err(StoreError::Embedding(
                "embedder configured with zero dimensions".to_string(),
            ));
        }

        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            // Whole words weigh more than their trigrams.
            vector[self.bucket(token)] += 2.0;

            let chars: Vec<char> = token.chars().collect();
            for window in chars.windows(3) {
                let trigram = window.iter().collect::<String>();
                vector[self.bucket(&trigram)] += 1.0;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::{Embedder, HashingEmbedder};

    #[test]
    fn embedder_is_deterministic() -> Result<(), crate::StoreError> {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed("Analista SAP sênior")?;
        let second = embedder.embed("Analista SAP sênior")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn embedder_outputs_expected_length() -> Result<(), crate::StoreError> {
        let embedder = HashingEmbedder { dimensions: 32 };
        assert_eq!(embedder.embed("abc")?.len(), 32);
        assert_eq!(embedder.embed("")?.len(), 32);
        Ok(())
    }

    #[test]
    fn zero_dimensions_is_an_error() {
        let embedder = HashingEmbedder { dimensions: 0 };
        assert!(embedder.embed("abc").is_err());
    }

    #[test]
    fn batch_matches_single_embeddings() -> Result<(), crate::StoreError> {
        let embedder = HashingEmbedder::default();
        let batch = embedder.embed_batch(&["java", "python"])?;
        assert_eq!(batch[1], embedder.embed("python")?);
        Ok(())
    }
}
