//! Service/endpoint configuration model, loader, validator and parameter
//! engine (spec §3, §4.2, §4.3).

pub mod error;
pub mod loader;
pub mod model;
pub mod params;
pub mod schema;
pub mod transform;
pub mod validation;

pub use error::{ConfigError, ConfigResult, ParamError, ValidationIssue};
pub use loader::ConfigLoader;
pub use model::{
    AuthConfig, CacheConfig, CommandDescription, CommandGroupDescription, ConfigFile, EndpointDescription,
    HttpMethod, LoadedConfig, Pagination, ParamLocation, ParamType, ParamValidation, Parameter, ResponseShaping,
    ResponseType, RetryOverride, ServiceDescription,
};
pub use params::{resolve as resolve_params, ResolvedParam};
pub use transform::Transform;
