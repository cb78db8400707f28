pub use super::types::BetaMessage as CreateMessageResponse;
