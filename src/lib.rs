//! Switchboard MCP Server
//!
//! A Model Context Protocol (MCP) server that exposes tools, resources, and
//! prompts to AI clients over stdio or HTTP, with filesystem discovery of
//! annotated component definitions.
//!
//! # Architecture
//!
//! The server is organised in layers:
//!
//! 1. **Protocol Layer** (`protocol`, `codec`) - JSON-RPC 2.0 framing, MCP
//!    types, capability negotiation, and request dispatch
//! 2. **Registry Layer** (`registry`, `routing`) - typed component registries
//!    with metadata, search, and URI-template resolution
//! 3. **Transport Layer** (`transport`) - stdio (newline or LSP-style framing)
//!    and HTTP via axum
//! 4. **Discovery Layer** (`discovery`) - annotation scanning, registration,
//!    and filesystem watching for live reload
//! 5. **Server Layer** (`server`) - lifecycle, health, and diagnostics
//!
//! # Features
//!
//! - **Capability Negotiation**: declared features intersected with each client
//! - **Component Discovery**: `@mcp-tool` style annotations scanned from source
//! - **Live Reload**: watched directories re-register components on change
//! - **Built-ins**: echo and system-info tools, file resource, prompt templates

pub mod builtin;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod routing;
pub mod server;
pub mod transport;

pub use error::{Error, Result};

/// Server version reported in `initialize` results and diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
