//! Blocking client with the same semantics as [`crate::Client`].
//!
//! Every call runs on the caller's thread. Pagination is exposed as a plain [`Iterator`] that
//! fetches pages on demand.

// self
use crate::{
	_prelude::*,
	auth::{Authenticator, Clock, OAuth1Token, RequestToken},
	endpoint::Endpoints,
	error::TransportError,
	http::{ApiRequest, ApiResponse, BlockingTransport},
	obs::{self, OpKind},
	pagination::{self, CursorStep, Page, PageCursor, PageIter},
	session::Session,
};

/// Blocking Bitbucket REST client bound to one transport and one authenticator.
#[derive(Debug)]
pub struct BlockingClient<T>
where
	T: BlockingTransport,
{
	transport: T,
	session: Session,
}
impl<T> BlockingClient<T>
where
	T: BlockingTransport,
{
	/// Creates a client.
	pub fn new(transport: T, endpoints: Endpoints, authenticator: Authenticator) -> Self {
		Self { transport, session: Session::new(endpoints, authenticator) }
	}

	/// Replaces the clock used for signatures and token expiry.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.session.clock = clock;

		self
	}

	/// Overrides the `User-Agent` header.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.session.user_agent = user_agent.into();

		self
	}

	/// Endpoint set in use.
	pub fn endpoints(&self) -> &Endpoints {
		&self.session.endpoints
	}

	/// Authenticator bound to this client.
	pub fn authenticator(&self) -> &Authenticator {
		&self.session.authenticator
	}

	/// Underlying transport.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Blocking [`crate::Client::send`].
	pub fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		obs::observe_blocking(OpKind::Request, "send", || self.execute(&request))
	}

	/// Blocking [`crate::Client::request`].
	pub fn request<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		Session::decode(&self.send(request)?)
	}

	/// `GET path` decoded as JSON.
	pub fn get<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(ApiRequest::get(path))
	}

	/// `POST path` with a JSON body, decoded as JSON.
	pub fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.request(ApiRequest::post(path).json(body)?)
	}

	/// `PUT path` with a JSON body, decoded as JSON.
	pub fn put<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.request(ApiRequest::put(path).json(body)?)
	}

	/// `DELETE path`, returning the raw response.
	pub fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.send(ApiRequest::delete(path))
	}

	/// Blocking [`crate::Client::redirect_location`].
	pub fn redirect_location(&self, request: ApiRequest) -> Result<String> {
		obs::observe_blocking(OpKind::RedirectLocation, "redirect_location", || {
			Session::redirect_target(&self.execute_once(&request)?)
		})
	}

	/// Blocking [`crate::Client::list`].
	pub fn list<R>(&self, first: ApiRequest, max: usize) -> Result<Vec<R>>
	where
		R: DeserializeOwned,
	{
		let mut cursor = PageCursor::new(first);
		let mut items = Vec::new();

		loop {
			match cursor.step() {
				CursorStep::Item(item) => items.push(item),
				CursorStep::Fetch(request) if pagination::wants_more(items.len(), max) =>
					cursor.absorb(self.fetch_page(request)?),
				_ => return Ok(items),
			}
		}
	}

	/// Lazy iterator over a paginated collection.
	///
	/// Creating the iterator performs no I/O. Dropping it stops pagination.
	pub fn pages<R>(
		&self,
		first: ApiRequest,
	) -> PageIter<R, impl FnMut(ApiRequest) -> Result<Page<R>> + '_>
	where
		R: DeserializeOwned,
	{
		PageIter::new(first, move |request| self.fetch_page(request))
	}

	/// Blocking [`crate::Client::request_token`].
	pub fn request_token(&self) -> Result<RequestToken> {
		obs::observe_blocking(OpKind::RequestToken, "request_token", || {
			let handshake = self.session.three_legged("request_token")?;
			let url = &self.session.endpoints.request_token;
			let authorization = handshake.sign_request_token(url, self.session.now())?;
			let response = self.dispatch(self.session.handshake_request(url, &authorization)?)?;

			handshake.accept_request_token(response.status, &response.body)
		})
	}

	/// OAuth 1.0a authorization URL for the obtained request token.
	pub fn authorization_url(&self) -> Result<Url> {
		self.session
			.three_legged("authorization_url")?
			.authorization_url(&self.session.endpoints.authorize)
	}

	/// Blocking [`crate::Client::authenticate_with_pin`].
	pub fn authenticate_with_pin(&self, verifier: &str) -> Result<OAuth1Token> {
		obs::observe_blocking(OpKind::AccessToken, "authenticate_with_pin", || {
			let handshake = self.session.three_legged("access_token")?;
			let url = &self.session.endpoints.access_token;
			let authorization = handshake.sign_access_token(url, verifier, self.session.now())?;
			let request = self.session.handshake_request(url, &authorization)?;
			let response = self.dispatch(request).inspect_err(|_| handshake.reset())?;

			handshake.accept_access_token(response.status, &response.body)
		})
	}

	fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let response = self.execute_once(request)?;

		match self.session.follow_up(request, &response)? {
			Some(next) => {
				let response =
					obs::observe_blocking(OpKind::Redirect, "follow", || self.execute_once(&next))?;

				Session::finish(response, true)
			},
			None => Session::finish(response, false),
		}
	}

	fn execute_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
		self.refresh_token()?;

		let mut http = self.session.build(request)?;

		self.session.authorize(&mut http)?;

		self.dispatch(http)
	}

	fn refresh_token(&self) -> Result<()> {
		let Some(request) = self.session.refresh_request()? else {
			return Ok(());
		};

		obs::observe_blocking(OpKind::TokenRefresh, "refresh_token", || {
			self.session.accept_refresh(&self.dispatch(request)?)
		})
	}

	fn fetch_page<R>(&self, request: ApiRequest) -> Result<Page<R>>
	where
		R: DeserializeOwned,
	{
		obs::observe_blocking(OpKind::PageFetch, "fetch_page", || {
			Session::decode(&self.execute(&request)?)
		})
	}

	fn dispatch(&self, request: HttpRequest) -> Result<ApiResponse> {
		self.transport
			.send(request)
			.map(ApiResponse::from)
			.map_err(|e| TransportError::network(e).into())
	}
}
