//! MCP protocol layer: wire types, capability negotiation, and dispatch.

pub mod capabilities;
pub mod handler;
pub mod types;

pub use capabilities::CapabilitySet;
pub use handler::ProtocolHandler;
pub use types::{JSONRPC_VERSION, MCP_VERSION};
