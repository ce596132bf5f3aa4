//! OAuth 2.0 client-credentials token cache.
//!
//! The cache refreshes when `now >= issued_at + expires_in - REFRESH_MARGIN`. A token
//! without `expires_in` is considered expired immediately, so the next call fetches a new
//! one. Concurrent callers inside the refresh window may each trigger a refresh; the last
//! response wins.

// self
use crate::{
	_prelude::*,
	auth::{Credential, OAuth2Token},
	error::AuthenticationError,
};

/// Safety margin subtracted from the token lifetime.
pub const REFRESH_MARGIN: Duration = Duration::seconds(5);

/// Token endpoint payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	refresh_token: Option<String>,
	/// Space-delimited scope list.
	#[serde(default)]
	scopes: Option<String>,
	#[serde(default)]
	token_type: Option<String>,
}

#[derive(Debug)]
struct CachedToken {
	token: OAuth2Token,
	refresh_at: Option<OffsetDateTime>,
}
impl CachedToken {
	fn new(token: OAuth2Token) -> Self {
		let refresh_at = token
			.expires_at()
			.map(|expires_at| expires_at.checked_sub(REFRESH_MARGIN).unwrap_or(expires_at));

		Self { token, refresh_at }
	}
}

/// Refreshing bearer-token cache for the `client_credentials` grant.
#[derive(Debug)]
pub struct ClientCredentials {
	credential: Credential,
	cache: Mutex<Option<CachedToken>>,
}
impl ClientCredentials {
	/// Creates an empty cache; the first call fetches a token.
	pub fn new(credential: Credential) -> Self {
		Self { credential, cache: Mutex::new(None) }
	}

	/// Seeds the cache with a previously obtained token.
	pub fn with_token(credential: Credential, token: OAuth2Token) -> Self {
		Self { credential, cache: Mutex::new(Some(CachedToken::new(token))) }
	}

	/// Consumer credential used for HTTP Basic auth against the token endpoint.
	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Snapshot of the cached token.
	pub fn token(&self) -> Option<OAuth2Token> {
		self.cache.lock().as_ref().map(|cached| cached.token.clone())
	}

	/// Instant from which the cached token is refreshed, if a lifetime is known.
	pub fn refresh_at(&self) -> Option<OffsetDateTime> {
		self.cache.lock().as_ref().and_then(|cached| cached.refresh_at)
	}

	/// Returns `true` when the next call must fetch a new token first.
	pub fn needs_refresh(&self, now: OffsetDateTime) -> bool {
		match &*self.cache.lock() {
			Some(CachedToken { refresh_at: Some(refresh_at), .. }) => now >= *refresh_at,
			_ => true,
		}
	}

	/// Drops the cached token so the next call fetches a new one.
	pub fn invalidate(&self) {
		*self.cache.lock() = None;
	}

	/// Form body for the token endpoint.
	///
	/// Uses `grant_type=refresh_token` when the cached token carries a refresh token and
	/// `grant_type=client_credentials` otherwise.
	pub fn refresh_form(&self) -> String {
		let mut form = url::form_urlencoded::Serializer::new(String::new());

		match self.cache.lock().as_ref().and_then(|cached| cached.token.refresh_token()) {
			Some(refresh_token) => {
				form.append_pair("grant_type", "refresh_token");
				form.append_pair("refresh_token", refresh_token);
			},
			None => {
				form.append_pair("grant_type", "client_credentials");
			},
		}

		form.finish()
	}

	/// Consumes a token endpoint response, replacing the cached token on success.
	///
	/// A rejected `refresh_token` grant drops the cached token, so the next call falls
	/// back to `client_credentials`. Other failures leave the cache untouched.
	pub fn accept_token_response(
		&self,
		status: StatusCode,
		body: &[u8],
		now: OffsetDateTime,
	) -> Result<OAuth2Token> {
		if status != StatusCode::OK {
			let mut cache = self.cache.lock();

			if cache.as_ref().is_some_and(|cached| cached.token.refresh_token().is_some()) {
				*cache = None;
			}

			return Err(AuthenticationError::TokenEndpoint {
				status: status.as_u16(),
				body: String::from_utf8_lossy(body).into_owned(),
			}
			.into());
		}

		let token = parse_token_response(body, now)?;

		*self.cache.lock() = Some(CachedToken::new(token.clone()));

		Ok(token)
	}

	/// `Authorization: Bearer` value for the cached token.
	pub fn authorization(&self) -> Result<String> {
		let cache = self.cache.lock();
		let cached = cache.as_ref().ok_or(AuthenticationError::MissingAccessToken)?;

		Ok(format!("Bearer {}", cached.token.access_token()))
	}
}

fn parse_token_response(body: &[u8], now: OffsetDateTime) -> Result<OAuth2Token> {
	let mut de = serde_json::Deserializer::from_slice(body);
	let response: TokenResponse = serde_path_to_error::deserialize(&mut de)
		.map_err(|e| AuthenticationError::MalformedTokenResponse { reason: e.to_string() })?;
	let mut token =
		OAuth2Token::new(response.access_token, now).map_err(AuthenticationError::from)?;

	if let Some(expires_in) = response.expires_in {
		token = token.with_expires_in(Duration::seconds(expires_in)).map_err(|e| {
			AuthenticationError::MalformedTokenResponse { reason: e.to_string() }
		})?;
	}
	if let Some(refresh_token) = response.refresh_token {
		token = token.with_refresh_token(refresh_token);
	}
	if let Some(token_type) = response.token_type {
		token = token.with_token_type(token_type);
	}
	if let Some(scopes) = response.scopes {
		token = token.with_scopes(scopes.split_whitespace());
	}

	Ok(token)
}
