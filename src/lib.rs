#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]

//! eight-sleep-mcp library: the pieces behind the `eight-sleep-mcp` binary.
//!
//! - `config`: JSON file / env-var configuration loading
//! - `error`: the crate-wide error type
//! - `client`: authenticated HTTP client with single-flight token refresh
//! - `models`: vendor payloads and the shapes returned to agents
//! - `api`: one typed method per vendor resource
//! - `tools`: MCP tool definitions and handlers
//! - `mcp`: MCP JSON-RPC protocol handler (stdio)

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
