pub use super::types::ModelInfo as GetModelResponse;
