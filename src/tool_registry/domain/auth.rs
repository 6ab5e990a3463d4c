//! Authentication settings for remote MCP transports.
//!
//! Some remote MCP servers expect a provider-specific credential header
//! instead of a bearer `Authorization` header. [`AuthHeaderAdapter`] holds
//! that mapping as configuration so no provider is special-cased in code.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Minimum token length below which a registration advisory is raised.
pub const MIN_TOKEN_LENGTH: usize = 10;

/// Header used for bearer credentials.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Header used for API keys when no provider mapping applies.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// How a remote server expects its credential to be presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// No credential is sent.
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// The raw token in an API-key header.
    ApiKey,
}

impl AuthScheme {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bearer => "bearer",
            Self::ApiKey => "api_key",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AuthScheme {
    type Error = ToolRegistryDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "none" => Ok(Self::None),
            "bearer" | "token" => Ok(Self::Bearer),
            "api_key" | "apikey" | "api-key" => Ok(Self::ApiKey),
            _ => Err(ToolRegistryDomainError::UnknownAuthType(value.to_owned())),
        }
    }
}

/// Credential configuration for an HTTP or SSE transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpAuth {
    scheme: AuthScheme,
    token: Option<String>,
    provider: Option<String>,
}

impl McpAuth {
    /// Creates credentials without a token.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            scheme: AuthScheme::None,
            token: None,
            provider: None,
        }
    }

    /// Creates bearer credentials.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::none()
            .with_scheme(AuthScheme::Bearer)
            .with_token(token)
    }

    /// Creates API-key credentials.
    #[must_use]
    pub fn api_key(token: impl Into<String>) -> Self {
        Self::none()
            .with_scheme(AuthScheme::ApiKey)
            .with_token(token)
    }

    /// Sets the credential scheme.
    #[must_use]
    pub const fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the token; blank tokens are treated as absent.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let normalized = token.into().trim().to_owned();
        self.token = (!normalized.is_empty()).then_some(normalized);
        self
    }

    /// Sets the provider identifier used for header mapping.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        let normalized = provider.into().trim().to_ascii_lowercase();
        self.provider = (!normalized.is_empty()).then_some(normalized);
        self
    }

    /// Returns the credential scheme.
    #[must_use]
    pub const fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Returns the token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the provider identifier, if any.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

/// Provider identifier to credential header mapping.
///
/// # Examples
///
/// ```
/// use pilotis::tool_registry::domain::{AuthHeaderAdapter, McpAuth};
///
/// let adapter = AuthHeaderAdapter::new().with_provider("tavily", "X-Tavily-Key");
/// let auth = McpAuth::bearer("secret-token-value").with_provider("tavily");
///
/// let (name, value) = adapter.derive_header(&auth).expect("header should be derived");
/// assert_eq!(name, "X-Tavily-Key");
/// assert_eq!(value, "secret-token-value");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthHeaderAdapter {
    provider_headers: BTreeMap<String, String>,
}

impl AuthHeaderAdapter {
    /// Creates an adapter without provider mappings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a provider identifier to the header that carries its credential.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>, header: impl Into<String>) -> Self {
        self.provider_headers.insert(
            provider.into().trim().to_ascii_lowercase(),
            header.into().trim().to_owned(),
        );
        self
    }

    /// Returns the mapped header name for a provider.
    #[must_use]
    pub fn header_for_provider(&self, provider: &str) -> Option<&str> {
        self.provider_headers
            .get(&provider.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns whether `header` carries credentials.
    ///
    /// `Authorization`, the default API-key header, and every mapped provider
    /// header count, compared case-insensitively.
    #[must_use]
    pub fn is_credential_header(&self, header: &str) -> bool {
        let candidate = header.trim();
        candidate.eq_ignore_ascii_case(AUTHORIZATION_HEADER)
            || candidate.eq_ignore_ascii_case(DEFAULT_API_KEY_HEADER)
            || self
                .provider_headers
                .values()
                .any(|mapped| mapped.eq_ignore_ascii_case(candidate))
    }

    /// Derives the credential header for `auth`.
    ///
    /// Returns `None` when there is no token or the scheme is `none`. A mapped
    /// provider always wins; otherwise bearer credentials use
    /// `Authorization` and API keys use `X-API-Key`.
    #[must_use]
    pub fn derive_header(&self, auth: &McpAuth) -> Option<(String, String)> {
        let token = auth.token()?;
        if auth.scheme() == AuthScheme::None {
            return None;
        }

        if let Some(header) = auth
            .provider()
            .and_then(|provider| self.header_for_provider(provider))
        {
            return Some((header.to_owned(), token.to_owned()));
        }

        match auth.scheme() {
            AuthScheme::Bearer => Some((AUTHORIZATION_HEADER.to_owned(), format!("Bearer {token}"))),
            AuthScheme::ApiKey => Some((DEFAULT_API_KEY_HEADER.to_owned(), token.to_owned())),
            AuthScheme::None => None,
        }
    }
}

/// Non-fatal warning raised while registering a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuthAdvisory {
    /// A remote server has neither a token nor a credential header.
    MissingCredentials,
    /// The supplied token is suspiciously short.
    ShortToken {
        /// Length of the supplied token in characters.
        length: usize,
    },
    /// A token is configured but the `none` scheme keeps it off the wire.
    IgnoredToken,
}

impl fmt::Display for AuthAdvisory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredentials => formatter.write_str(
                "no auth token or credential header configured; the server may reject requests",
            ),
            Self::ShortToken { length } => write!(
                formatter,
                "auth token is only {length} characters long (expected at least {MIN_TOKEN_LENGTH})"
            ),
            Self::IgnoredToken => formatter.write_str(
                "auth token is configured but auth type is 'none'; no credential header will be sent",
            ),
        }
    }
}
