pub mod request;
pub mod response;
pub mod stream;

pub use request::{transform_request};
pub use response::{transform_response};
pub use stream::{GeminiToOpenAIResponseStreamState};
