//! Curio Protocol - OpenAI-compatible wire types
//!
//! This crate defines the types exchanged with OpenAI-style clients:
//! - Chat completion requests and their validation
//! - Streaming chunks and aggregated completion responses
//! - Bearer credential extraction and normalization

mod credentials;
mod messages;
mod responses;

pub use credentials::*;
pub use messages::*;
pub use responses::*;
