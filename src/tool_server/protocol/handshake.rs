//! Initialize exchange payloads.

use super::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// MCP protocol revision this client requests.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name reported in the initialize request.
pub const CLIENT_NAME: &str = "tether";

/// Builds the `initialize` request parameters.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// What the server reported about itself while acknowledging initialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    protocol_version: String,
    name: Option<String>,
    version: Option<String>,
    capabilities: Value,
}

impl ServerInfo {
    /// Returns the negotiated protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Returns the server's self-reported name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the server's self-reported version.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the advertised capabilities object.
    #[must_use]
    pub const fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    /// Returns whether the server advertises the tools capability.
    #[must_use]
    pub fn supports_tools(&self) -> bool {
        self.capabilities.get("tools").is_some()
    }
}

/// Decodes the `initialize` result.
///
/// # Errors
///
/// Returns [`DecodeError`] when the result is not an object or lacks a
/// string `protocolVersion`.
pub fn decode_initialize_result(result: &Value) -> Result<ServerInfo, DecodeError> {
    let object = result
        .as_object()
        .ok_or_else(|| DecodeError::new("initialize result is not an object"))?;

    let protocol_version = object
        .get("protocolVersion")
        .and_then(Value::as_str)
        .filter(|version| !version.trim().is_empty())
        .ok_or_else(|| DecodeError::new("initialize result lacks protocolVersion"))?;

    let server_info = object.get("serverInfo");
    let text_field = |field: &str| {
        server_info
            .and_then(|info| info.get(field))
            .and_then(Value::as_str)
            .map(str::to_owned)
    };

    Ok(ServerInfo {
        protocol_version: protocol_version.to_owned(),
        name: text_field("name"),
        version: text_field("version"),
        capabilities: object
            .get("capabilities")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
    })
}
