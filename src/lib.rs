#![forbid(unsafe_code)]

//! Shared library for the grabtube relay.
//!
//! The relay binary accepts a YouTube link plus a format/quality choice and
//! answers with a direct download URL obtained from one of several external
//! conversion providers. Everything provider-facing lives here so the HTTP
//! surface in `bin/relay.rs` stays a thin layer of routing and validation.

pub mod config;
pub mod extract;
pub mod providers;
pub mod resolver;
pub mod security;
pub mod transport;
