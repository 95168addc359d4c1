use async_trait::async_trait;
use fxhash::hash64;

use super::{EmbeddingProvider, ProviderContent, ProviderError, ProviderInput, ProviderOutput};
use crate::secret::redact_url;

/// Deterministic in-process provider for local development and tests.
/// Generates sinusoid values derived from a hash of the input so the same
/// input always yields the same vector. Images are keyed on their URL
/// without the query, so rotating an access token does not change the vector.
#[derive(Debug, Clone)]
pub struct StubProvider {
    dimensions: usize,
}

impl StubProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed_content(&self, content: &ProviderContent) -> Vec<f32> {
        let h = match content {
            // Image and text hashes are salted apart so "x" the text and "x" the
            // URL never collide.
            ProviderContent::ImageUrl(url) => hash64(&(0u8, redact_url(url))),
            ProviderContent::ImageBytes(bytes) => hash64(&(0u8, &bytes[..])),
            ProviderContent::Text(text) => hash64(&(1u8, text.as_str())),
        };
        make_stub_vector(h, self.dimensions)
    }
}

fn make_stub_vector(h: u64, dimensions: usize) -> Vec<f32> {
    let mut v = vec![0f32; dimensions];
    for (idx, value) in v.iter_mut().enumerate() {
        *value = ((h >> (idx % 32)) as f32 * 0.0001).sin();
    }
    v
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn max_batch_size(&self) -> usize {
        64
    }

    async fn embed(&self, inputs: &[ProviderInput]) -> Result<Vec<ProviderOutput>, ProviderError> {
        Ok(inputs
            .iter()
            .map(|input| ProviderOutput::vector(input.key, self.embed_content(&input.content)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_has_configured_dimensions() {
        let stub = StubProvider::new(384);
        let v = stub.embed_content(&ProviderContent::Text("hello world".into()));
        assert_eq!(v.len(), 384);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn stub_is_deterministic() {
        let stub = StubProvider::new(32);
        let a = stub.embed_content(&ProviderContent::Text("same text".into()));
        let b = stub.embed_content(&ProviderContent::Text("same text".into()));
        assert_eq!(a, b);

        let c = stub.embed_content(&ProviderContent::Text("other text".into()));
        assert_ne!(a, c);
    }

    #[test]
    fn image_vector_ignores_token() {
        let stub = StubProvider::new(32);
        let a = stub.embed_content(&ProviderContent::ImageUrl(
            "https://blob/c/dog.jpg?sig=one".into(),
        ));
        let b = stub.embed_content(&ProviderContent::ImageUrl(
            "https://blob/c/dog.jpg?sig=two".into(),
        ));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embed_echoes_keys() {
        let stub = StubProvider::new(8);
        let inputs = vec![
            ProviderInput::new(4, ProviderContent::Text("a".into())),
            ProviderInput::new(9, ProviderContent::Text("b".into())),
        ];
        let outputs = stub.embed(&inputs).await.unwrap();
        assert_eq!(outputs.iter().map(|o| o.key).collect::<Vec<_>>(), vec![4, 9]);
        assert!(outputs.iter().all(|o| o.result.as_ref().unwrap().len() == 8));
    }
}
