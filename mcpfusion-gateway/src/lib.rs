//! Tool registry, dispatcher and knowledge store for MCPFusion (spec
//! §4.10), plus the `GatewayConfig` the gateway binary loads at startup.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod knowledge;
pub mod registry;

pub use config::GatewayConfig;
pub use dispatch::Dispatcher;
pub use error::{GatewayError, GatewayResult};
pub use registry::{Tool, ToolKind, ToolRegistry};
