pub mod client;
pub mod stream;
pub mod types;

pub use client::ApiClient;
pub use types::{ChatError, ChatRequest, StreamEvent};
