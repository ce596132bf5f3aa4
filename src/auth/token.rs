//! OAuth 1.0a token pairs, OAuth 2.0 bearer tokens, and the redacting secret wrapper.

// self
use crate::_prelude::*;

/// Validation failures raised while constructing or parsing tokens.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenError {
	/// A required field was present but empty.
	#[error("Token field `{field}` must not be empty.")]
	EmptyField {
		/// Field name.
		field: &'static str,
	},
	/// A required field was absent from a token response.
	#[error("Token response is missing `{field}`.")]
	MissingField {
		/// Field name.
		field: &'static str,
	},
	/// The reported lifetime pushes the expiry past the representable date range.
	#[error("Token lifetime of {seconds}s is out of range.")]
	LifetimeOutOfRange {
		/// Lifetime in seconds.
		seconds: i64,
	},
}

/// Secret string that never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a secret value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw secret. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the secret is the empty string.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenSecret(<redacted>)")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Short-lived OAuth 1.0a request token produced by the first handshake step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestToken {
	token: String,
	secret: TokenSecret,
}
impl RequestToken {
	/// Creates a request token; both fields must be non-empty.
	pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Result<Self, TokenError> {
		let (token, secret) = require_pair(token.into(), secret.into())?;

		Ok(Self { token, secret })
	}

	/// Parses an `oauth_token=..&oauth_token_secret=..` response body.
	pub fn from_form(body: &[u8]) -> Result<Self, TokenError> {
		let (token, secret) = parse_token_form(body)?;

		Self::new(token, secret)
	}

	/// Token value, embedded in the authorization URL.
	pub fn token(&self) -> &str {
		&self.token
	}

	/// Token secret.
	pub fn secret(&self) -> &str {
		self.secret.expose()
	}

	/// Borrowed `(token, secret)` pair for signing.
	pub fn pair(&self) -> (&str, &str) {
		(&self.token, self.secret.expose())
	}
}

/// Long-lived OAuth 1.0a access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuth1Token {
	token: String,
	secret: TokenSecret,
}
impl OAuth1Token {
	/// Creates an access token; both fields must be non-empty.
	pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Result<Self, TokenError> {
		let (token, secret) = require_pair(token.into(), secret.into())?;

		Ok(Self { token, secret })
	}

	/// Parses an `oauth_token=..&oauth_token_secret=..` response body.
	pub fn from_form(body: &[u8]) -> Result<Self, TokenError> {
		let (token, secret) = parse_token_form(body)?;

		Self::new(token, secret)
	}

	/// Token value.
	pub fn token(&self) -> &str {
		&self.token
	}

	/// Token secret.
	pub fn secret(&self) -> &str {
		self.secret.expose()
	}

	/// Borrowed `(token, secret)` pair for signing.
	pub fn pair(&self) -> (&str, &str) {
		(&self.token, self.secret.expose())
	}
}

fn require_pair(token: String, secret: String) -> Result<(String, TokenSecret), TokenError> {
	if token.is_empty() {
		return Err(TokenError::EmptyField { field: "oauth_token" });
	}
	if secret.is_empty() {
		return Err(TokenError::EmptyField { field: "oauth_token_secret" });
	}

	Ok((token, TokenSecret::new(secret)))
}

fn parse_token_form(body: &[u8]) -> Result<(String, String), TokenError> {
	let mut token = None;
	let mut secret = None;

	for (name, value) in url::form_urlencoded::parse(body) {
		match name.as_ref() {
			"oauth_token" => token = Some(value.into_owned()),
			"oauth_token_secret" => secret = Some(value.into_owned()),
			_ => {},
		}
	}

	Ok((
		token.ok_or(TokenError::MissingField { field: "oauth_token" })?,
		secret.ok_or(TokenError::MissingField { field: "oauth_token_secret" })?,
	))
}

/// OAuth 2.0 bearer token.
///
/// `expires_at` is never set directly: it is always `issued_at + expires_in` when the
/// provider reported a lifetime, and `None` otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuth2Token {
	access_token: TokenSecret,
	refresh_token: Option<TokenSecret>,
	token_type: String,
	scopes: Vec<String>,
	expires_in: Option<Duration>,
	issued_at: OffsetDateTime,
	expires_at: Option<OffsetDateTime>,
}
impl OAuth2Token {
	/// Creates a bearer token issued at `issued_at` with no known lifetime.
	pub fn new(
		access_token: impl Into<String>,
		issued_at: OffsetDateTime,
	) -> Result<Self, TokenError> {
		let access_token = access_token.into();

		if access_token.is_empty() {
			return Err(TokenError::EmptyField { field: "access_token" });
		}

		Ok(Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			token_type: "bearer".into(),
			scopes: Vec::new(),
			expires_in: None,
			issued_at,
			expires_at: None,
		})
	}

	/// Sets the lifetime and recomputes `expires_at`.
	///
	/// Fails when `issued_at + expires_in` cannot be represented.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Result<Self, TokenError> {
		let expires_at = self
			.issued_at
			.checked_add(expires_in)
			.ok_or(TokenError::LifetimeOutOfRange { seconds: expires_in.whole_seconds() })?;

		self.expires_in = Some(expires_in);
		self.expires_at = Some(expires_at);

		Ok(self)
	}

	/// Attaches a refresh token; empty values are ignored.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		let refresh_token = refresh_token.into();

		self.refresh_token = (!refresh_token.is_empty()).then(|| TokenSecret::new(refresh_token));

		self
	}

	/// Overrides the token type reported by the provider.
	pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Sets the granted scopes.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Access token value. Callers must avoid logging it.
	pub fn access_token(&self) -> &str {
		self.access_token.expose()
	}

	/// Refresh token, if the provider issued one.
	pub fn refresh_token(&self) -> Option<&str> {
		self.refresh_token.as_ref().map(TokenSecret::expose)
	}

	/// Token type (usually `bearer`).
	pub fn token_type(&self) -> &str {
		&self.token_type
	}

	/// Granted scopes.
	pub fn scopes(&self) -> &[String] {
		&self.scopes
	}

	/// Lifetime reported by the provider.
	pub fn expires_in(&self) -> Option<Duration> {
		self.expires_in
	}

	/// Instant the token was received.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Derived expiry instant.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}
}
