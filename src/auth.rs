//! Credentials, token models, and the authenticator variants bound to a client session.
//!
//! An [`Authenticator`] is chosen once when a client is constructed and owns its token
//! state exclusively. Variants that need network exchanges (the OAuth 1.0a handshake and
//! the OAuth 2.0 client-credentials refresh) expose sans-IO steps; the clients in
//! [`crate::client`] and [`crate::blocking`] drive them over a transport.

pub mod client_credentials;
pub mod oauth1;
pub mod token;

pub use client_credentials::*;
pub use oauth1::*;
pub use token::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::_prelude::*;

/// Source of the current instant, injected so token expiry can be tested deterministically.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the system's UTC time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Consumer key and secret identifying the calling application.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	key: String,
	secret: TokenSecret,
}
impl Credential {
	/// Creates a credential from a consumer key and secret.
	pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
		Self { key: key.into(), secret: TokenSecret::new(secret) }
	}

	/// Consumer key.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Consumer secret. Callers must avoid logging it.
	pub fn secret(&self) -> &str {
		self.secret.expose()
	}

	/// `Authorization: Basic` value for the key/secret pair.
	pub fn basic_authorization(&self) -> String {
		basic_authorization(&self.key, self.secret.expose())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential").field("key", &self.key).field("secret", &self.secret).finish()
	}
}

/// Strategy used to authorize every outgoing API call.
#[derive(Debug, Default)]
pub enum Authenticator {
	/// Anonymous access.
	#[default]
	None,
	/// HTTP Basic with a username and (app) password.
	Basic {
		/// Account username.
		username: String,
		/// Password or app password.
		password: TokenSecret,
	},
	/// OAuth 1.0a signed with consumer credentials only.
	OAuth1TwoLegged(OAuth1Signer),
	/// OAuth 1.0a with a request-token/verifier/access-token handshake.
	OAuth1ThreeLegged(ThreeLegged),
	/// OAuth 2.0 client credentials with a refreshing token cache.
	OAuth2ClientCredentials(ClientCredentials),
}
impl Authenticator {
	/// HTTP Basic authenticator.
	pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self::Basic { username: username.into(), password: TokenSecret::new(password) }
	}

	/// Two-legged OAuth 1.0a authenticator using HMAC-SHA1 and random nonces.
	pub fn two_legged(credential: Credential) -> Self {
		Self::OAuth1TwoLegged(OAuth1Signer::new(credential))
	}

	/// Three-legged OAuth 1.0a authenticator starting at the initial handshake stage.
	pub fn three_legged(credential: Credential) -> Self {
		Self::OAuth1ThreeLegged(ThreeLegged::new(OAuth1Signer::new(credential)))
	}

	/// OAuth 2.0 client-credentials authenticator with an empty cache.
	pub fn client_credentials(credential: Credential) -> Self {
		Self::OAuth2ClientCredentials(ClientCredentials::new(credential))
	}

	/// Stable label used in logs and errors.
	pub const fn kind(&self) -> &'static str {
		match self {
			Authenticator::None => "none",
			Authenticator::Basic { .. } => "basic",
			Authenticator::OAuth1TwoLegged(_) => "oauth1_two_legged",
			Authenticator::OAuth1ThreeLegged(_) => "oauth1_three_legged",
			Authenticator::OAuth2ClientCredentials(_) => "oauth2_client_credentials",
		}
	}

	/// Returns the handshake state machine when this is a three-legged authenticator.
	pub fn as_three_legged(&self) -> Option<&ThreeLegged> {
		match self {
			Authenticator::OAuth1ThreeLegged(handshake) => Some(handshake),
			_ => None,
		}
	}

	/// Returns the token cache when this is a client-credentials authenticator.
	pub fn as_client_credentials(&self) -> Option<&ClientCredentials> {
		match self {
			Authenticator::OAuth2ClientCredentials(cache) => Some(cache),
			_ => None,
		}
	}

	/// Computes the `Authorization` header for a request, if this variant sends one.
	///
	/// OAuth 1.0a variants produce a fresh signature (new nonce and timestamp) on every call.
	/// The client-credentials variant expects the caller to have refreshed the cache first.
	pub fn authorization(
		&self,
		method: &Method,
		url: &Url,
		now: OffsetDateTime,
	) -> Result<Option<String>> {
		match self {
			Authenticator::None => Ok(None),
			Authenticator::Basic { username, password } =>
				Ok(Some(basic_authorization(username, password.expose()))),
			Authenticator::OAuth1TwoLegged(signer) => signer
				.authorization(method, url, signer.token().map(OAuth1Token::pair), &[], now)
				.map(Some),
			Authenticator::OAuth1ThreeLegged(handshake) =>
				handshake.authorization(method, url, now).map(Some),
			Authenticator::OAuth2ClientCredentials(cache) => cache.authorization().map(Some),
		}
	}
}

fn basic_authorization(username: &str, password: &str) -> String {
	format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn user_url() -> Url {
		Url::parse("https://api.bitbucket.org/2.0/user").expect("Fixture URL should parse.")
	}

	#[test]
	fn credential_debug_redacts_secret() {
		let credential = Credential::new("consumer", "hunter2");
		let rendered = format!("{credential:?}");

		assert!(rendered.contains("consumer"));
		assert!(!rendered.contains("hunter2"));
	}

	#[test]
	fn basic_authenticator_encodes_user_and_password() {
		let auth = Authenticator::basic("alice", "app-pass");
		let header = auth
			.authorization(&Method::GET, &user_url(), OffsetDateTime::UNIX_EPOCH)
			.expect("Basic authorization should succeed.");

		assert_eq!(header.as_deref(), Some("Basic YWxpY2U6YXBwLXBhc3M="));
		assert_eq!(auth.kind(), "basic");
	}

	#[test]
	fn anonymous_authenticator_sends_nothing() {
		let header = Authenticator::None
			.authorization(&Method::GET, &user_url(), OffsetDateTime::UNIX_EPOCH)
			.expect("Anonymous authorization should succeed.");

		assert!(header.is_none());
	}

	#[test]
	fn two_legged_signs_without_token() {
		let auth = Authenticator::two_legged(Credential::new("ck", "cs"));
		let header = auth
			.authorization(&Method::GET, &user_url(), OffsetDateTime::UNIX_EPOCH)
			.expect("Two-legged signing should succeed.")
			.expect("Two-legged signing should produce a header.");

		assert!(header.starts_with("OAuth "));
		assert!(header.contains("oauth_consumer_key=\"ck\""));
		assert!(!header.contains("oauth_token="));
	}

	#[test]
	fn client_credentials_without_token_cannot_sign() {
		let auth = Authenticator::client_credentials(Credential::new("ck", "cs"));
		let err = auth
			.authorization(&Method::GET, &user_url(), OffsetDateTime::UNIX_EPOCH)
			.expect_err("Signing without a cached token should fail.");

		assert!(matches!(
			err,
			Error::Authentication(crate::error::AuthenticationError::MissingAccessToken)
		));
	}
}
