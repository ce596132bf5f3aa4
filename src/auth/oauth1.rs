//! OAuth 1.0a signing and the three-legged handshake state machine.
//!
//! The handshake moves strictly forward:
//!
//! `Initial -> RequestTokenObtained -> AuthorizationUrlIssued -> AccessTokenObtained`
//!
//! Each transition is split into a signing step (producing the `Authorization` header for
//! the outgoing request) and an accept step (consuming the provider's response), so the
//! same state machine serves both the async and the blocking client.

// self
use crate::{
	_prelude::*,
	auth::{Credential, OAuth1Token, RequestToken},
	error::AuthenticationError,
	signature::{self, NonceSource, RandomNonce, SignatureMethod, SignatureRequest},
};

/// Callback value for out-of-band (PIN) verification.
pub const OUT_OF_BAND: &str = "oob";

/// Produces OAuth 1.0a `Authorization` headers for a consumer credential.
#[derive(Clone)]
pub struct OAuth1Signer {
	credential: Credential,
	token: Option<OAuth1Token>,
	method: SignatureMethod,
	nonce: Arc<dyn NonceSource>,
}
impl OAuth1Signer {
	/// Creates an HMAC-SHA1 signer drawing nonces from [`RandomNonce`].
	pub fn new(credential: Credential) -> Self {
		Self {
			credential,
			token: None,
			method: SignatureMethod::default(),
			nonce: Arc::new(RandomNonce),
		}
	}

	/// Overrides the signature method. Unsupported methods fail when a request is signed.
	pub fn with_method(mut self, method: SignatureMethod) -> Self {
		self.method = method;

		self
	}

	/// Replaces the nonce source (e.g., with a seeded or fixed source in tests).
	pub fn with_nonce_source(mut self, nonce: Arc<dyn NonceSource>) -> Self {
		self.nonce = nonce;

		self
	}

	/// Binds an access token used by two-legged signing.
	pub fn with_token(mut self, token: OAuth1Token) -> Self {
		self.token = Some(token);

		self
	}

	/// Consumer credential.
	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Token bound with [`OAuth1Signer::with_token`].
	pub fn token(&self) -> Option<&OAuth1Token> {
		self.token.as_ref()
	}

	/// Signature method in use.
	pub fn method(&self) -> SignatureMethod {
		self.method
	}

	/// Signs a request and returns the `Authorization: OAuth ...` header value.
	///
	/// Every call draws a fresh nonce and stamps `now` as the timestamp.
	pub fn authorization(
		&self,
		method: &Method,
		url: &Url,
		token: Option<(&str, &str)>,
		extra: &[(&'static str, &str)],
		now: OffsetDateTime,
	) -> Result<String> {
		let nonce = self.nonce.nonce();
		let timestamp = signature::timestamp(now);
		let mut request = SignatureRequest::new(
			url,
			method.as_str(),
			self.credential.key(),
			self.credential.secret(),
			&timestamp,
			&nonce,
		)
		.with_method(self.method);

		if let Some((token, secret)) = token {
			request = request.with_token(token, secret);
		}
		for &(name, value) in extra {
			request = request.with_extra(name, value);
		}

		let signed = signature::sign(&request)?;

		Ok(signature::authorization_header(&request.oauth_parameters(), &signed.value))
	}
}
impl Debug for OAuth1Signer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth1Signer")
			.field("credential", &self.credential)
			.field("token", &self.token)
			.field("method", &self.method)
			.finish_non_exhaustive()
	}
}

/// Public view of the handshake position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandshakeStage {
	/// No request token has been obtained.
	Initial,
	/// A request token is held; the authorization URL has not been issued.
	RequestTokenObtained,
	/// The authorization URL was issued; waiting for the verifier.
	AuthorizationUrlIssued,
	/// An access token is available for signing.
	AccessTokenObtained,
}
impl HandshakeStage {
	/// Returns a stable label suitable for logs and errors.
	pub const fn as_str(self) -> &'static str {
		match self {
			HandshakeStage::Initial => "initial",
			HandshakeStage::RequestTokenObtained => "request_token_obtained",
			HandshakeStage::AuthorizationUrlIssued => "authorization_url_issued",
			HandshakeStage::AccessTokenObtained => "access_token_obtained",
		}
	}
}
impl Display for HandshakeStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Default)]
enum HandshakeState {
	#[default]
	Initial,
	RequestTokenObtained(RequestToken),
	AuthorizationUrlIssued(RequestToken),
	AccessTokenObtained(OAuth1Token),
}
impl HandshakeState {
	fn stage(&self) -> HandshakeStage {
		match self {
			HandshakeState::Initial => HandshakeStage::Initial,
			HandshakeState::RequestTokenObtained(_) => HandshakeStage::RequestTokenObtained,
			HandshakeState::AuthorizationUrlIssued(_) => HandshakeStage::AuthorizationUrlIssued,
			HandshakeState::AccessTokenObtained(_) => HandshakeStage::AccessTokenObtained,
		}
	}
}

/// Three-legged OAuth 1.0a handshake plus the resulting protected-resource signer.
#[derive(Debug)]
pub struct ThreeLegged {
	signer: OAuth1Signer,
	callback: String,
	state: Mutex<HandshakeState>,
}
impl ThreeLegged {
	/// Starts a handshake at [`HandshakeStage::Initial`] with the `oob` callback.
	pub fn new(signer: OAuth1Signer) -> Self {
		Self { signer, callback: OUT_OF_BAND.into(), state: Mutex::new(HandshakeState::Initial) }
	}

	/// Resumes a session from a previously obtained access token.
	pub fn with_access_token(signer: OAuth1Signer, token: OAuth1Token) -> Self {
		Self {
			signer,
			callback: OUT_OF_BAND.into(),
			state: Mutex::new(HandshakeState::AccessTokenObtained(token)),
		}
	}

	/// Overrides the `oauth_callback` sent with the request-token step.
	pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
		self.callback = callback.into();

		self
	}

	/// Underlying signer.
	pub fn signer(&self) -> &OAuth1Signer {
		&self.signer
	}

	/// Current handshake stage.
	pub fn stage(&self) -> HandshakeStage {
		self.state.lock().stage()
	}

	/// Access token, once the handshake completed.
	pub fn access_token(&self) -> Option<OAuth1Token> {
		match &*self.state.lock() {
			HandshakeState::AccessTokenObtained(token) => Some(token.clone()),
			_ => None,
		}
	}

	/// Discards all handshake state and returns to [`HandshakeStage::Initial`].
	pub fn reset(&self) {
		*self.state.lock() = HandshakeState::Initial;
	}

	/// Signs the request-token call. Restarts the handshake from the initial stage.
	pub fn sign_request_token(&self, url: &Url, now: OffsetDateTime) -> Result<String> {
		self.reset();

		self.signer.authorization(
			&Method::POST,
			url,
			None,
			&[("oauth_callback", self.callback.as_str())],
			now,
		)
	}

	/// Consumes the request-token response.
	///
	/// Anything but `200` with a well-formed token body leaves the handshake at the initial
	/// stage.
	pub fn accept_request_token(&self, status: StatusCode, body: &[u8]) -> Result<RequestToken> {
		let token = parse_token_response(status, body, RequestToken::from_form);
		let mut state = self.state.lock();

		match token {
			Ok(token) => {
				*state = HandshakeState::RequestTokenObtained(token.clone());

				Ok(token)
			},
			Err(e) => {
				*state = HandshakeState::Initial;

				Err(e)
			},
		}
	}

	/// Builds the URL the user must visit to authorize the request token.
	///
	/// Nothing is sent. Issuing the URL again for the same request token is allowed.
	pub fn authorization_url(&self, authorize: &Url) -> Result<Url> {
		let mut state = self.state.lock();
		let token = match &*state {
			HandshakeState::RequestTokenObtained(token)
			| HandshakeState::AuthorizationUrlIssued(token) => token.clone(),
			other =>
				return Err(AuthenticationError::HandshakeOrder {
					step: "authorization_url",
					stage: other.stage(),
				}
				.into()),
		};
		let mut url = authorize.clone();

		url.query_pairs_mut().append_pair("oauth_token", token.token());

		*state = HandshakeState::AuthorizationUrlIssued(token);

		Ok(url)
	}

	/// Signs the access-token call with the request token and the user's verifier (PIN).
	pub fn sign_access_token(
		&self,
		url: &Url,
		verifier: &str,
		now: OffsetDateTime,
	) -> Result<String> {
		let token = match &*self.state.lock() {
			HandshakeState::AuthorizationUrlIssued(token) => token.clone(),
			other =>
				return Err(AuthenticationError::HandshakeOrder {
					step: "access_token",
					stage: other.stage(),
				}
				.into()),
		};

		self.signer
			.authorization(
				&Method::POST,
				url,
				Some(token.pair()),
				&[("oauth_verifier", verifier)],
				now,
			)
			.inspect_err(|_| self.reset())
	}

	/// Consumes the access-token response. Any failure discards the handshake.
	pub fn accept_access_token(&self, status: StatusCode, body: &[u8]) -> Result<OAuth1Token> {
		let mut state = self.state.lock();

		if !matches!(&*state, HandshakeState::AuthorizationUrlIssued(_)) {
			return Err(AuthenticationError::HandshakeOrder {
				step: "access_token",
				stage: state.stage(),
			}
			.into());
		}

		match parse_token_response(status, body, OAuth1Token::from_form) {
			Ok(token) => {
				*state = HandshakeState::AccessTokenObtained(token.clone());

				Ok(token)
			},
			Err(e) => {
				*state = HandshakeState::Initial;

				Err(e)
			},
		}
	}

	/// Signs a protected-resource call with the access token.
	pub fn authorization(&self, method: &Method, url: &Url, now: OffsetDateTime) -> Result<String> {
		let token = self.access_token().ok_or(AuthenticationError::MissingAccessToken)?;

		self.signer.authorization(method, url, Some(token.pair()), &[], now)
	}
}

fn parse_token_response<T>(
	status: StatusCode,
	body: &[u8],
	parse: impl FnOnce(&[u8]) -> Result<T, crate::auth::TokenError>,
) -> Result<T> {
	if status != StatusCode::OK {
		return Err(AuthenticationError::TokenEndpoint {
			status: status.as_u16(),
			body: String::from_utf8_lossy(body).into_owned(),
		}
		.into());
	}

	parse(body).map_err(|e| AuthenticationError::from(e).into())
}
