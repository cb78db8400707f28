//! Wire-format types for the three canonical API surfaces relaymux speaks:
//! OpenAI (ChatCompletion + Response API), Gemini, and Claude Messages.
//!
//! This crate is pure data: request/response/stream event structs with serde
//! derives, no conversion logic and no IO. See `relaymux-transform` for the
//! conversions between these formats.

pub mod claude;
pub mod gemini;
pub mod openai;
pub mod sse;

pub use sse::{SseEvent, SseParser};
