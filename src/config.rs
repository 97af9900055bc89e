//! Environment configuration for launching the observability tool server.
//!
//! Values are read through a lookup closure so tests never touch the
//! process environment. Credentials are forwarded to the server through
//! its environment only.

use crate::tool_server::domain::{
    ConnectionPolicy, DEFAULT_CALL_TIMEOUT, DEFAULT_STARTUP_TIMEOUT, LaunchConfig,
    ToolServerDomainError,
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Environment URL of the observability tenant.
pub const ENVIRONMENT_URL_VAR: &str = "DT_ENVIRONMENT";
/// Platform token the server authenticates with.
pub const PLATFORM_TOKEN_VAR: &str = "DT_PLATFORM_TOKEN";
/// Telemetry opt-out forwarded to the server.
pub const DISABLE_TELEMETRY_VAR: &str = "DT_MCP_DISABLE_TELEMETRY";
/// Query budget forwarded to the server when set.
pub const QUERY_BUDGET_VAR: &str = "DT_GRAIL_QUERY_BUDGET_GB";
/// Server executable override.
pub const SERVER_COMMAND_VAR: &str = "TETHER_SERVER_COMMAND";
/// Whitespace-separated server arguments override.
pub const SERVER_ARGS_VAR: &str = "TETHER_SERVER_ARGS";
/// Handshake timeout in seconds.
pub const STARTUP_TIMEOUT_VAR: &str = "TETHER_STARTUP_TIMEOUT_SECS";
/// Default per-call timeout in seconds.
pub const CALL_TIMEOUT_VAR: &str = "TETHER_CALL_TIMEOUT_SECS";
/// Connection policy, `persistent` or `per_call`.
pub const CONNECTION_POLICY_VAR: &str = "TETHER_CONNECTION_POLICY";

/// Command used when no override is configured.
pub const DEFAULT_SERVER_COMMAND: &str = "npx";
/// Arguments used when no override is configured.
pub const DEFAULT_SERVER_ARGS: &str = "-y @dynatrace-oss/dynatrace-mcp-server@latest";

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set to an unusable value.
    #[error("invalid value for {variable}: {reason}")]
    Invalid {
        /// Offending variable.
        variable: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The resulting launch configuration is invalid.
    #[error(transparent)]
    Domain(#[from] ToolServerDomainError),
}

/// Settings for reaching the observability tool server.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    environment_url: String,
    platform_token: String,
    disable_telemetry: String,
    query_budget_gb: Option<String>,
    server_command: String,
    server_args: Vec<String>,
    startup_timeout: Duration,
    call_timeout: Duration,
    policy: ConnectionPolicy,
}

impl fmt::Debug for EnvironmentConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EnvironmentConfig")
            .field("environment_url", &self.environment_url)
            .field("platform_token", &"<redacted>")
            .field("disable_telemetry", &self.disable_telemetry)
            .field("query_budget_gb", &self.query_budget_gb)
            .field("server_command", &self.server_command)
            .field("server_args", &self.server_args)
            .field("startup_timeout", &self.startup_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("policy", &self.policy)
            .finish()
    }
}

impl EnvironmentConfig {
    /// Reads configuration through `lookup`. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when the environment URL or token is
    /// absent and [`ConfigError::Invalid`] for malformed URLs, timeouts or
    /// policies.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let environment_url =
            read(ENVIRONMENT_URL_VAR).ok_or(ConfigError::Missing(ENVIRONMENT_URL_VAR))?;
        if !(environment_url.starts_with("https://") || environment_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                variable: ENVIRONMENT_URL_VAR,
                reason: "must start with https:// or http://".to_owned(),
            });
        }
        let platform_token =
            read(PLATFORM_TOKEN_VAR).ok_or(ConfigError::Missing(PLATFORM_TOKEN_VAR))?;

        let policy = read(CONNECTION_POLICY_VAR)
            .map(|value| {
                ConnectionPolicy::try_from(value.as_str()).map_err(|err| ConfigError::Invalid {
                    variable: CONNECTION_POLICY_VAR,
                    reason: err.to_string(),
                })
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            environment_url,
            platform_token,
            disable_telemetry: read(DISABLE_TELEMETRY_VAR).unwrap_or_else(|| "true".to_owned()),
            query_budget_gb: read(QUERY_BUDGET_VAR),
            server_command: read(SERVER_COMMAND_VAR)
                .unwrap_or_else(|| DEFAULT_SERVER_COMMAND.to_owned()),
            server_args: read(SERVER_ARGS_VAR)
                .as_deref()
                .unwrap_or(DEFAULT_SERVER_ARGS)
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            startup_timeout: parse_seconds(
                STARTUP_TIMEOUT_VAR,
                read(STARTUP_TIMEOUT_VAR),
                DEFAULT_STARTUP_TIMEOUT,
            )?,
            call_timeout: parse_seconds(
                CALL_TIMEOUT_VAR,
                read(CALL_TIMEOUT_VAR),
                DEFAULT_CALL_TIMEOUT,
            )?,
            policy,
        })
    }

    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_process_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Returns the tenant environment URL.
    #[must_use]
    pub fn environment_url(&self) -> &str {
        &self.environment_url
    }

    /// Returns the query budget forwarded to the server, if set.
    #[must_use]
    pub fn query_budget_gb(&self) -> Option<&str> {
        self.query_budget_gb.as_deref()
    }

    /// Returns the connection policy.
    #[must_use]
    pub const fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// Returns the default per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Builds the launch configuration for the tool server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Domain`] when the command is empty or a
    /// timeout is zero.
    pub fn launch_config(&self) -> Result<LaunchConfig, ConfigError> {
        let mut env = vec![
            (ENVIRONMENT_URL_VAR.to_owned(), self.environment_url.clone()),
            (PLATFORM_TOKEN_VAR.to_owned(), self.platform_token.clone()),
            (
                DISABLE_TELEMETRY_VAR.to_owned(),
                self.disable_telemetry.clone(),
            ),
        ];
        if let Some(budget) = &self.query_budget_gb {
            env.push((QUERY_BUDGET_VAR.to_owned(), budget.clone()));
        }

        Ok(LaunchConfig::new(self.server_command.as_str())?
            .with_args(self.server_args.iter().cloned())
            .with_env(env)?
            .with_startup_timeout(self.startup_timeout)?
            .with_call_timeout(self.call_timeout)?)
    }
}

fn parse_seconds(
    variable: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(text) = raw else {
        return Ok(default);
    };
    match text.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            variable,
            reason: "must be greater than zero".to_owned(),
        }),
        Ok(seconds) => Ok(Duration::from_secs(seconds)),
        Err(err) => Err(ConfigError::Invalid {
            variable,
            reason: format!("'{text}' is not a whole number of seconds: {err}"),
        }),
    }
}
