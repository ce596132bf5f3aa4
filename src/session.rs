//! Transport-free execution core shared by the async and blocking clients.
//!
//! A client call is always the same sequence of decisions:
//!
//! 1. refresh the OAuth 2.0 token if the cache says so ([`Session::refresh_request`]);
//! 2. build and authorize the request ([`Session::build`], [`Session::authorize`]);
//! 3. decide whether the response asks for one redirect hop ([`Session::follow_up`]);
//! 4. map the final response onto a result ([`Session::finish`]).
//!
//! Only the actual `send` differs between the two clients.

// self
use crate::{
	_prelude::*,
	auth::{Authenticator, Clock, SystemClock, ThreeLegged},
	endpoint::Endpoints,
	error::{ApiError, ConfigError, RedirectError},
	http::{ApiRequest, ApiResponse, Params},
};

/// Default `User-Agent` sent with every request.
pub(crate) const DEFAULT_USER_AGENT: &str =
	concat!("bitbucket-rest/", env!("CARGO_PKG_VERSION"));

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

pub(crate) struct Session {
	pub(crate) endpoints: Endpoints,
	pub(crate) authenticator: Authenticator,
	pub(crate) clock: Arc<dyn Clock>,
	pub(crate) user_agent: String,
}
impl Session {
	pub(crate) fn new(endpoints: Endpoints, authenticator: Authenticator) -> Self {
		Self {
			endpoints,
			authenticator,
			clock: Arc::new(SystemClock),
			user_agent: DEFAULT_USER_AGENT.into(),
		}
	}

	pub(crate) fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	/// Builds the wire request. `Accept: application/json` is set on every call so no
	/// response-format state carries over between requests.
	pub(crate) fn build(&self, request: &ApiRequest) -> Result<HttpRequest> {
		let mut url = self.endpoints.resolve(&request.path)?;
		let pairs = request.params.pairs();

		if !pairs.is_empty() {
			url.query_pairs_mut().extend_pairs(pairs);
		}

		let mut builder = oauth2::http::Request::builder()
			.method(request.method.clone())
			.uri(url.as_str())
			.header(header::ACCEPT, JSON)
			.header(header::USER_AGENT, self.user_agent.as_str());
		let body = match &request.body {
			Some(body) if request.sends_body() => {
				builder = builder.header(header::CONTENT_TYPE, JSON);

				serde_json::to_vec(body).map_err(ConfigError::EncodeBody)?
			},
			_ => Vec::new(),
		};

		Ok(builder.body(body).map_err(ConfigError::from)?)
	}

	/// Attaches the authenticator's `Authorization` header, signing against the final URL.
	pub(crate) fn authorize(&self, request: &mut HttpRequest) -> Result<()> {
		let raw = request.uri().to_string();
		let url =
			Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })?;
		let authorization = self.authenticator.authorization(request.method(), &url, self.now())?;

		if let Some(value) = authorization {
			let value = HeaderValue::from_str(&value).map_err(ConfigError::from)?;

			request.headers_mut().insert(header::AUTHORIZATION, value);
		}

		Ok(())
	}

	/// Token endpoint request, when the client-credentials cache is due for a refresh.
	pub(crate) fn refresh_request(&self) -> Result<Option<HttpRequest>> {
		let Some(cache) = self.authenticator.as_client_credentials() else {
			return Ok(None);
		};

		if !cache.needs_refresh(self.now()) {
			return Ok(None);
		}

		let request = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(self.endpoints.oauth2_token.as_str())
			.header(header::ACCEPT, JSON)
			.header(header::USER_AGENT, self.user_agent.as_str())
			.header(header::AUTHORIZATION, cache.credential().basic_authorization())
			.header(header::CONTENT_TYPE, FORM)
			.body(cache.refresh_form().into_bytes())
			.map_err(ConfigError::from)?;

		Ok(Some(request))
	}

	pub(crate) fn accept_refresh(&self, response: &ApiResponse) -> Result<()> {
		if let Some(cache) = self.authenticator.as_client_credentials() {
			cache.accept_token_response(response.status, &response.body, self.now())?;
		}

		Ok(())
	}

	/// Three-legged handshake, or a configuration error naming `operation`.
	pub(crate) fn three_legged(&self, operation: &'static str) -> Result<&ThreeLegged> {
		self.authenticator.as_three_legged().ok_or_else(|| {
			ConfigError::AuthenticatorMismatch {
				operation,
				required: "oauth1_three_legged",
				configured: self.authenticator.kind(),
			}
			.into()
		})
	}

	/// Signed `POST` to an OAuth 1.0a token endpoint.
	pub(crate) fn handshake_request(
		&self,
		url: &Url,
		authorization: &str,
	) -> Result<HttpRequest> {
		Ok(oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(url.as_str())
			.header(header::USER_AGENT, self.user_agent.as_str())
			.header(header::AUTHORIZATION, authorization)
			.body(Vec::new())
			.map_err(ConfigError::from)?)
	}

	/// Builds the single follow-up request for a redirect response.
	///
	/// Targets under the API base become relative paths; the `Location` query string is
	/// re-parsed into parameters. `303 See Other` switches to `GET` without a body, every
	/// other redirect keeps the original method and body.
	pub(crate) fn follow_up(
		&self,
		request: &ApiRequest,
		response: &ApiResponse,
	) -> Result<Option<ApiRequest>> {
		if !response.is_redirect() {
			return Ok(None);
		}

		let location = response
			.location()
			.ok_or(RedirectError::MissingLocation { status: response.status.as_u16() })?;
		let current = self.endpoints.resolve(&request.path)?;
		let mut target = current.join(location).map_err(|source| {
			RedirectError::InvalidLocation { location: location.to_owned(), source }
		})?;
		let mut params = Params::new();

		for (name, value) in target.query_pairs() {
			params.append(name, value);
		}

		target.set_query(None);
		target.set_fragment(None);

		let path =
			self.endpoints.relative_to_api(&target).unwrap_or_else(|| target.to_string());
		let (method, body) = if response.status == StatusCode::SEE_OTHER {
			(Method::GET, None)
		} else {
			(request.method.clone(), request.body.clone())
		};

		Ok(Some(ApiRequest { method, path, params, body }))
	}

	/// Maps the final response of a call.
	///
	/// 2xx passes through. After a followed hop, a second redirect is also returned as-is
	/// rather than followed or raised. Anything else becomes an [`ApiError`].
	pub(crate) fn finish(response: ApiResponse, followed: bool) -> Result<ApiResponse> {
		if response.is_success() || (followed && response.is_redirect()) {
			Ok(response)
		} else {
			Err(ApiError::new(response.status.as_u16(), response.text()).into())
		}
	}

	/// Decodes a finished response, refusing an unfollowed second redirect.
	pub(crate) fn decode<T>(response: &ApiResponse) -> Result<T>
	where
		T: DeserializeOwned,
	{
		if response.is_redirect() {
			return Err(RedirectError::UnfollowedRedirect {
				status: response.status.as_u16(),
				location: response.location().unwrap_or_default().to_owned(),
			}
			.into());
		}

		response.json()
	}

	/// Extracts the `Location` of a response that must be a redirect.
	pub(crate) fn redirect_target(response: &ApiResponse) -> Result<String> {
		let status = response.status.as_u16();

		if !response.is_redirect() {
			return Err(RedirectError::NotRedirect { status }.into());
		}

		Ok(response.location().ok_or(RedirectError::MissingLocation { status })?.to_owned())
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("endpoints", &self.endpoints)
			.field("authenticator", &self.authenticator)
			.field("user_agent", &self.user_agent)
			.finish_non_exhaustive()
	}
}
