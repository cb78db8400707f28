//! Collapse a streamed upstream response into a single non-streamed body.
//!
//! Used by the fallback Response-API-to-ChatCompletion path (§4.5), which
//! disables streaming on the wire but still needs to consume an SSE stream
//! from an upstream that only speaks the streamed shape.

pub mod claude;
pub mod gemini;
pub mod openai_chat_completions;
pub mod openai_response;

pub use claude::ClaudeStreamToMessageState;
pub use gemini::GeminiStreamToResponseState;
pub use openai_chat_completions::OpenAIChatCompletionStreamToResponseState;
pub use openai_response::OpenAIResponseStreamToResponseState;
