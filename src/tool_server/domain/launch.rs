//! Launch configuration for a stdio tool-server subprocess.

use super::ToolServerDomainError;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default time allowed for the initialize exchange. `npx` may need to
/// download the server package on first launch.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time allowed for a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Default time the process gets to exit at each teardown step.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Everything needed to spawn and talk to a tool server over stdio.
///
/// Credentials belong in [`LaunchConfig::env`], never in the argument list,
/// where they would be visible in process listings.
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
    startup_timeout: Duration,
    call_timeout: Duration,
    shutdown_grace: Duration,
}

impl LaunchConfig {
    /// Creates a configuration for `command` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::EmptyCommand`] when `command` is empty
    /// after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(ToolServerDomainError::EmptyCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Replaces the command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Adds environment overrides applied on top of the inherited
    /// environment. Later duplicates replace earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::InvalidEnvironmentKey`] when a key is
    /// empty or contains `=` or NUL.
    pub fn with_env(
        mut self,
        values: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ToolServerDomainError> {
        for (key, value) in values {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ToolServerDomainError::InvalidEnvironmentKey(key));
            }
            self.env.insert(key, value);
        }
        Ok(self)
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, ToolServerDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolServerDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Sets the handshake timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::ZeroDuration`] for a zero duration.
    pub fn with_startup_timeout(mut self, value: Duration) -> Result<Self, ToolServerDomainError> {
        self.startup_timeout = non_zero(value, "startup timeout")?;
        Ok(self)
    }

    /// Sets the default per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::ZeroDuration`] for a zero duration.
    pub fn with_call_timeout(mut self, value: Duration) -> Result<Self, ToolServerDomainError> {
        self.call_timeout = non_zero(value, "call timeout")?;
        Ok(self)
    }

    /// Sets the grace period given to each teardown step.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::ZeroDuration`] for a zero duration.
    pub fn with_shutdown_grace(mut self, value: Duration) -> Result<Self, ToolServerDomainError> {
        self.shutdown_grace = non_zero(value, "shutdown grace")?;
        Ok(self)
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the environment overrides.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    /// Returns the handshake timeout.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Returns the default per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Returns the teardown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

impl fmt::Debug for LaunchConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted_env: BTreeMap<&str, &str> = self
            .env
            .keys()
            .map(|key| (key.as_str(), "<redacted>"))
            .collect();
        formatter
            .debug_struct("LaunchConfig")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &redacted_env)
            .field("working_directory", &self.working_directory)
            .field("startup_timeout", &self.startup_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

const fn non_zero(
    value: Duration,
    label: &'static str,
) -> Result<Duration, ToolServerDomainError> {
    if value.is_zero() {
        return Err(ToolServerDomainError::ZeroDuration(label));
    }
    Ok(value)
}
