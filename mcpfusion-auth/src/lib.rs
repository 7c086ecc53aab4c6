//! Authentication strategies, the multi-tenant token manager, and the
//! helper-flow bridge's server side (spec §4.4, §4.5, §4.9).

pub mod error;
pub mod helper_flow;
pub mod manager;
pub mod registry;
pub mod strategies;
pub mod strategy;

pub use error::{AuthError, AuthResult};
pub use helper_flow::HelperFlow;
pub use manager::AuthManager;
pub use registry::StrategyRegistry;
pub use strategy::{AuthContext, AuthStrategy, PreparedRequest};
