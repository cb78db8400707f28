pub use crate::claude::list_models::types::BetaModelInfo as ModelInfo;
