// ABOUTME: Library root for gog-lite — governance control plane plus the CLI built on it.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod governance;
pub mod output;
pub mod secrets;
pub mod store;
