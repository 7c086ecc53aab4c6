//! Embedded, single-process key/value store providing tenant isolation
//! (spec §4.1). Built on `sled`, whose lock-free trees and cross-tree
//! transactions give the bucket-tree layout and the ACID guarantees the
//! spec asks for without an external database process.

pub mod error;
pub mod model;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use model::{ApiTokenMetadata, KnowledgeEntry, StoredToken, User};
pub use mcpfusion_core::authcode::IssuedAuthCode;
pub use store::Store;
