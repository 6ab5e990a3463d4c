//! Turns stored transport configuration into connection-ready plans.

use super::McpManagerSettings;
use crate::tool_registry::{
    domain::{
        AuthAdvisory, AuthHeaderAdapter, AuthScheme, HttpTransportConfig, MIN_TOKEN_LENGTH,
        McpServerConfig, McpTransport, StdioTransportConfig, ToolRegistryDomainError,
    },
    ports::{RemotePlan, StdioPlan, TransportPlan},
};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parent-process state a STDIO child inherits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnvironment {
    vars: BTreeMap<String, String>,
    current_dir: PathBuf,
}

impl ProcessEnvironment {
    /// Creates an environment from explicit values.
    #[must_use]
    pub fn new(vars: BTreeMap<String, String>, current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars,
            current_dir: current_dir.into(),
        }
    }

    /// Captures the current process environment. Variables that are not
    /// valid UTF-8 are skipped.
    #[must_use]
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        let current_dir = std::env::current_dir().unwrap_or_default();
        Self { vars, current_dir }
    }

    /// Returns the inherited variables.
    #[must_use]
    pub const fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Returns the directory relative paths are resolved against.
    #[must_use]
    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }
}

/// Builds the transport plan for a server.
///
/// # Errors
///
/// Returns [`ToolRegistryDomainError::CommandNotFound`] when a STDIO command
/// cannot be resolved to an executable.
pub fn plan_transport(
    server: &McpServerConfig,
    settings: &McpManagerSettings,
    environment: &ProcessEnvironment,
) -> Result<TransportPlan, ToolRegistryDomainError> {
    Ok(match server.transport() {
        McpTransport::Http(remote) => {
            TransportPlan::Http(remote_plan(remote, &settings.auth_headers, None))
        }
        McpTransport::Sse(remote) => TransportPlan::Sse(remote_plan(
            remote,
            &settings.auth_headers,
            Some(settings.tool_execution_timeout),
        )),
        McpTransport::Stdio(stdio) => TransportPlan::Stdio(stdio_plan(stdio, environment)?),
    })
}

/// Merges explicit headers with the derived credential header.
///
/// An explicit header with the same name (case-insensitive) wins over the
/// derived one.
#[must_use]
pub fn remote_plan(
    remote: &HttpTransportConfig,
    auth_headers: &AuthHeaderAdapter,
    read_timeout: Option<Duration>,
) -> RemotePlan {
    let mut headers = remote.headers().clone();
    if let Some((name, value)) = auth_headers.derive_header(remote.auth()) {
        let overridden = headers
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(&name));
        if !overridden {
            headers.insert(name, value);
        }
    }

    RemotePlan {
        url: remote.url().to_owned(),
        headers,
        read_timeout,
    }
}

/// Lists credential warnings for a remote server.
///
/// STDIO servers never produce advisories.
#[must_use]
pub fn auth_advisories(server: &McpServerConfig, auth_headers: &AuthHeaderAdapter) -> Vec<AuthAdvisory> {
    let Some(remote) = server.transport().remote() else {
        return Vec::new();
    };

    let auth = remote.auth();
    let token = auth.token();
    let has_credential_header = remote
        .headers()
        .keys()
        .any(|name| auth_headers.is_credential_header(name));

    let mut advisories = Vec::new();
    if token.is_none() && !has_credential_header {
        advisories.push(AuthAdvisory::MissingCredentials);
    }
    if token.is_some() && auth.scheme() == AuthScheme::None {
        advisories.push(AuthAdvisory::IgnoredToken);
    }
    if let Some(length) = token
        .map(|value| value.chars().count())
        .filter(|length| *length < MIN_TOKEN_LENGTH)
    {
        advisories.push(AuthAdvisory::ShortToken { length });
    }
    advisories
}

/// Resolves the executable and environment for a STDIO server.
///
/// # Errors
///
/// Returns [`ToolRegistryDomainError::CommandNotFound`] when the command
/// cannot be resolved to an executable.
pub fn stdio_plan(
    stdio: &StdioTransportConfig,
    environment: &ProcessEnvironment,
) -> Result<StdioPlan, ToolRegistryDomainError> {
    let search_path = environment.vars().get("PATH").map(OsStr::new);
    let program = resolve_command(stdio.command(), search_path, environment.current_dir())?;

    let mut env = environment.vars().clone();
    env.extend(
        stdio
            .env()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );

    Ok(StdioPlan {
        program,
        args: stdio.args().to_vec(),
        env,
        working_directory: stdio
            .working_directory()
            .map(|directory| environment.current_dir().join(directory)),
    })
}

/// Resolves `command` to an absolute executable path.
///
/// Absolute paths are used as given, paths containing a separator are
/// resolved against `current_dir`, and bare names are searched on
/// `search_path`.
///
/// # Errors
///
/// Returns [`ToolRegistryDomainError::CommandNotFound`] when no executable
/// file matches.
pub fn resolve_command(
    command: &str,
    search_path: Option<&OsStr>,
    current_dir: &Path,
) -> Result<PathBuf, ToolRegistryDomainError> {
    let not_found = || ToolRegistryDomainError::CommandNotFound(command.to_owned());
    let candidate = Path::new(command);

    if candidate.is_absolute() {
        return is_executable(candidate)
            .then(|| candidate.to_path_buf())
            .ok_or_else(not_found);
    }

    if command.contains('/') || command.contains(std::path::MAIN_SEPARATOR) {
        let joined = current_dir.join(candidate);
        return is_executable(&joined).then_some(joined).ok_or_else(not_found);
    }

    search_path
        .into_iter()
        .flat_map(std::env::split_paths)
        .map(|directory| current_dir.join(directory).join(command))
        .find(|path| is_executable(path))
        .ok_or_else(not_found)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
