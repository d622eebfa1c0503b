//! # galley-remote
//!
//! HTTP implementation of [`galley_sync::RecipeRemote`].
//!
//! Requests and responses are JSON; file contents travel base64-encoded.
//! Status is computed locally from the remote manifest, so the server never
//! sees the local tree.

mod client;
mod wire;

pub use client::HttpRemote;
