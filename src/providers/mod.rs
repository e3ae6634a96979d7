pub mod embedding;
pub mod generation;

pub use embedding::{EmbeddingProvider, HashedEmbeddingProvider, OpenAIEmbeddingProvider};
pub use generation::{
    AnthropicGenerationService, Generation, GenerationRequest, GenerationService, Message,
    MockGenerationService, Pricing,
};
