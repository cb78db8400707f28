pub mod response;

pub use response::{transform_response};
