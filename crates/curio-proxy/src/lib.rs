//! Curio Proxy - OpenAI-compatible gateway for the Cursor chat backend.
//!
//! OpenAI clients speak `/v1/chat/completions` JSON. This crate exposes that
//! HTTP surface and relays each request to the Cursor backend through
//! `curio-cursor`, which handles the checksum, the binary framing, and the
//! reassembly of the streamed reply.
//!
//! Design goals:
//! - Accept OpenAI chat completion traffic, streaming or not.
//! - Forward the caller's bearer credential as the upstream session token.
//! - Relay fragments as SSE chunks in arrival order, without buffering.

pub mod config;
pub mod server;
pub mod streaming;

pub use config::GatewayConfig;
pub use server::serve;
