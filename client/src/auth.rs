//! Authorization schemes for outbound calls.
//!
//! A client carries at most one scheme per kind. All kinds except
//! [`AuthKind::ApiKey`] are applied as request headers; an API key travels
//! as a query parameter instead.

/// The kind of credential a scheme carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// `Authorization: Basic <token>`.
    Basic,
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `X-Access-Token: <token>`.
    AccessToken,
    /// `Secret: <token>`.
    Secret,
    /// `?APIKey=<token>` query parameter.
    ApiKey,
}

/// One credential attached to a client.
#[derive(Debug, Clone)]
pub struct AuthScheme {
    kind: AuthKind,
    token: String,
}

impl AuthScheme {
    /// Basic authorization header.
    #[must_use]
    pub const fn basic(token: String) -> Self {
        Self {
            kind: AuthKind::Basic,
            token,
        }
    }

    /// Bearer authorization header.
    #[must_use]
    pub const fn bearer(token: String) -> Self {
        Self {
            kind: AuthKind::Bearer,
            token,
        }
    }

    /// `X-Access-Token` header.
    #[must_use]
    pub const fn access_token(token: String) -> Self {
        Self {
            kind: AuthKind::AccessToken,
            token,
        }
    }

    /// `Secret` header.
    #[must_use]
    pub const fn secret(token: String) -> Self {
        Self {
            kind: AuthKind::Secret,
            token,
        }
    }

    /// API key query parameter.
    #[must_use]
    pub const fn api_key(token: String) -> Self {
        Self {
            kind: AuthKind::ApiKey,
            token,
        }
    }

    /// The credential kind.
    #[must_use]
    pub const fn kind(&self) -> AuthKind {
        self.kind
    }

    /// The raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Replace the token, keeping the kind.
    pub fn set_token(&mut self, token: String) {
        self.token = token;
    }

    /// Whether this scheme is applied as a query parameter instead of a
    /// header.
    #[must_use]
    pub const fn applies_as_query(&self) -> bool {
        matches!(self.kind, AuthKind::ApiKey)
    }

    /// Header (or query parameter) name this scheme writes to.
    #[must_use]
    pub const fn header_name(&self) -> &'static str {
        match self.kind {
            AuthKind::Basic | AuthKind::Bearer => "Authorization",
            AuthKind::AccessToken => "X-Access-Token",
            AuthKind::Secret => "Secret",
            AuthKind::ApiKey => "APIKey",
        }
    }

    /// Full header value, prefix included.
    #[must_use]
    pub fn header_value(&self) -> String {
        match self.kind {
            AuthKind::Basic => format!("Basic {}", self.token),
            AuthKind::Bearer => format!("Bearer {}", self.token),
            AuthKind::AccessToken | AuthKind::Secret | AuthKind::ApiKey => self.token.clone(),
        }
    }
}
