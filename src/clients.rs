pub mod generation;

pub use generation::{
    GeneratedQuestion, GenerationGateway, GenerationRequest, HttpGenerationGateway,
};
