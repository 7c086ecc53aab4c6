//! HTTP request engine: builds and dispatches one tool call against an
//! upstream service, applying authentication, retries, circuit breaking,
//! response shaping, pagination and caching (spec §4.6-§4.8).

pub mod cache;
pub mod engine;
pub mod error;
pub mod output;
pub mod pagination;
pub mod path;
pub mod request;

pub use cache::ResponseCache;
pub use engine::RequestEngine;
pub use error::{HttpEngineError, HttpResult};
pub use output::ToolOutput;
pub use pagination::NextPage;
pub use request::{Body, RequestSpec};
