//! Command-group tools (spec §4.10): `command_<id>` tools backed by
//! locally-executed programs. Actual execution is explicitly out of scope
//! (spec §4.10, §1 Non-goals); this module exists to guarantee the one
//! invariant the spec does require of it: a command-group tool call must
//! never be routed to the HTTP engine. [`dispatch`] always returns a
//! configuration-category error rather than shelling out, so that
//! invariant holds regardless of what a future local-execution backend
//! does.

use serde_json::Value;

use crate::dispatch::DispatchError;
use crate::error::GatewayError;

pub fn dispatch(group: &str, _args: &serde_json::Map<String, Value>) -> Result<mcpfusion_http::ToolOutput, DispatchError> {
    Err(GatewayError::CommandNotImplemented(group.to_string()).into())
}
