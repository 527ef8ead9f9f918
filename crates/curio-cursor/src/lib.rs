//! Curio Cursor - client for the Cursor chat backend
//!
//! The backend speaks the connect protocol over binary protobuf. This crate
//! covers the three pieces that translation depends on:
//! - [`ChecksumGenerator`]: the `x-cursor-checksum` header derived from the
//!   session credential
//! - [`codec`]: request encoding and envelope decoding
//! - [`translate`] / [`CursorClient`]: driving the upstream call and
//!   reassembling streamed fragments

mod checksum;
mod client;
pub mod codec;
mod error;
mod translator;
pub mod wire;

pub use checksum::{mix_timestamp, ChecksumGenerator};
pub use client::{
    CursorClient, CursorClientConfig, DEFAULT_CLIENT_VERSION, DEFAULT_CURSOR_URL, DEFAULT_TIMEZONE,
};
pub use codec::{decode_chunk, encode_request, Decoded, FrameDecoder, StreamFragment};
pub use error::{CursorError, CursorResult, DecodeDegraded};
pub use translator::{
    fragments, translate, translate_with, AggregatedResponse, CompletionMeta, TranslatorEvent,
};
