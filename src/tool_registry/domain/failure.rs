//! Failure taxonomy shared by connection establishment and tool invocation.
//!
//! Classification is driven by structured error data first (HTTP status
//! codes, protocol error codes) and falls back to message markers. Marker
//! precedence is fixed: authentication, not-found, rate limit, timeout,
//! transport, then generic.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

const AUTH_MARKERS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "unauthorised",
    "forbidden",
    "authentication",
    "invalid api key",
    "invalid token",
    "permission denied",
    "access denied",
];

const NOT_FOUND_MARKERS: &[&str] = &["404", "not found", "unknown tool", "no such tool"];

const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "quota exceeded",
];

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline exceeded", "408"];

const TRANSPORT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "not connected",
    "disconnected",
    "broken pipe",
    "unexpected eof",
    "transport",
    "network",
    "bad gateway",
    "service unavailable",
    "502",
    "503",
    "504",
    "dns",
];

const TRANSIENT_CONNECTION_MARKERS: &[&str] = &[
    "gateway",
    "timeout",
    "timed out",
    "unavailable",
    "overloaded",
    "temporar",
    "502",
    "503",
    "504",
    "connection refused",
    "connection reset",
    "dns",
];

const RETRY_AFTER_MARKERS: &[&str] = &["retry-after", "retry after", "retry_after"];

/// Classified cause of a failed MCP operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Credentials were rejected.
    Authentication,
    /// The endpoint or tool does not exist.
    NotFound,
    /// The server is throttling requests.
    RateLimited {
        /// Server-provided back-off hint.
        retry_after: Option<Duration>,
    },
    /// The operation did not finish in time.
    Timeout,
    /// The connection to the server broke.
    Transport,
    /// The tool ran and reported a failure of its own.
    ToolLogic,
    /// Anything not covered above.
    Generic,
}

impl FailureClass {
    /// Classifies an error message by its markers.
    ///
    /// Never yields [`FailureClass::ToolLogic`]; that class needs structured
    /// evidence from the protocol layer.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        let contains_any = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));

        if contains_any(AUTH_MARKERS) {
            Self::Authentication
        } else if contains_any(NOT_FOUND_MARKERS) {
            Self::NotFound
        } else if contains_any(RATE_LIMIT_MARKERS) {
            Self::RateLimited {
                retry_after: parse_retry_after(&lowered),
            }
        } else if contains_any(TIMEOUT_MARKERS) {
            Self::Timeout
        } else if contains_any(TRANSPORT_MARKERS) {
            Self::Transport
        } else {
            Self::Generic
        }
    }

    /// Returns the payload-free kind.
    #[must_use]
    pub const fn kind(self) -> FailureKind {
        match self {
            Self::Authentication => FailureKind::Authentication,
            Self::NotFound => FailureKind::NotFound,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Timeout => FailureKind::Timeout,
            Self::Transport => FailureKind::Transport,
            Self::ToolLogic => FailureKind::ToolLogic,
            Self::Generic => FailureKind::Generic,
        }
    }
}

/// Payload-free failure kind carried in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credentials were rejected.
    Authentication,
    /// The endpoint or tool does not exist.
    NotFound,
    /// The server is throttling requests.
    RateLimited,
    /// The operation did not finish in time.
    Timeout,
    /// The connection to the server broke.
    Transport,
    /// The tool reported a failure of its own.
    ToolLogic,
    /// Anything else.
    Generic,
}

impl FailureKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::ToolLogic => "tool_logic",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Extracts a `Retry-After` hint in whole seconds from an error message.
#[must_use]
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let lowered = message.to_ascii_lowercase();
    RETRY_AFTER_MARKERS.iter().find_map(|marker| {
        let (_, rest) = lowered.split_once(marker)?;
        let digits: String = rest
            .trim_start_matches(|character: char| {
                character == ':' || character == '=' || character.is_whitespace()
            })
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse::<u64>().ok().map(Duration::from_secs)
    })
}

/// User-facing description of a failed connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFailure {
    message: String,
    transient: bool,
}

impl ConnectionFailure {
    /// Classifies a raw connection error for the named server by its
    /// markers.
    #[must_use]
    pub fn classify(server_name: &str, raw: &str) -> Self {
        Self::from_class(server_name, FailureClass::from_message(raw), raw)
    }

    /// Builds the failure from an already classified error.
    ///
    /// Rate limits and errors carrying a transient marker may succeed on
    /// another attempt.
    #[must_use]
    pub fn from_class(server_name: &str, class: FailureClass, raw: &str) -> Self {
        let lowered = raw.to_ascii_lowercase();
        let transient = matches!(class, FailureClass::RateLimited { .. })
            || TRANSIENT_CONNECTION_MARKERS
                .iter()
                .any(|marker| lowered.contains(marker));

        let message = match class {
            FailureClass::Authentication => format!(
                "Authentication failed for MCP server '{server_name}'. Check the configured credentials."
            ),
            FailureClass::NotFound => format!(
                "MCP server '{server_name}' was not found at the configured endpoint. Check the URL or command."
            ),
            FailureClass::RateLimited { .. } => format!(
                "MCP server '{server_name}' is rate limiting connections. Try again later."
            ),
            FailureClass::Timeout => {
                format!("Connection to MCP server '{server_name}' timed out: {raw}")
            }
            FailureClass::Transport => {
                format!("Could not reach MCP server '{server_name}': {raw}")
            }
            FailureClass::ToolLogic | FailureClass::Generic => {
                format!("Failed to connect to MCP server '{server_name}': {raw}")
            }
        };

        Self { message, transient }
    }

    /// Describes a configuration problem that no retry can fix.
    #[must_use]
    pub fn permanent(server_name: &str, raw: &str) -> Self {
        Self {
            message: format!("MCP server '{server_name}' is misconfigured: {raw}"),
            transient: false,
        }
    }

    /// Returns the user-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.transient
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}
