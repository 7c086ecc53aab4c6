//! Cross-cutting types shared by every MCPFusion crate: error categories,
//! correlation ids, the per-request tenant context, the log/error
//! sanitiser, and the helper-flow auth-code blob.

pub mod authcode;
pub mod correlation;
pub mod error;
pub mod redact;
pub mod tenant;

pub use authcode::{AuthCodeBlob, AuthCodeError, IssuedAuthCode};
pub use correlation::CorrelationId;
pub use error::{Categorized, ErrorCategory, ToolError};
pub use tenant::TenantContext;
