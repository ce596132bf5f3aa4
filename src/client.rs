//! Async client: request execution, OAuth 1.0a handshake drivers, and pagination.
//!
//! Every call runs the same pipeline: refresh the OAuth 2.0 token when due, build and sign
//! the request, send it, follow at most one redirect hop, and map non-2xx responses onto
//! [`ApiError`](crate::error::ApiError). Nothing is retried.

// crates.io
use futures::{
	Stream,
	stream::{AbortRegistration, Abortable},
};
// self
use crate::{
	_prelude::*,
	auth::{Authenticator, Clock, OAuth1Token, RequestToken},
	endpoint::Endpoints,
	error::TransportError,
	http::{ApiRequest, ApiResponse, AsyncTransport},
	obs::{self, OpKind},
	pagination::{self, Page, PageCursor},
	session::Session,
};

/// Async Bitbucket REST client bound to one transport and one authenticator.
#[derive(Debug)]
pub struct Client<T>
where
	T: AsyncTransport,
{
	transport: T,
	session: Session,
}
impl<T> Client<T>
where
	T: AsyncTransport,
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

	/// Executes a request, following at most one redirect.
	///
	/// Returns the response unchanged on 2xx. If the followed hop answers with another
	/// redirect, that redirect is returned as-is. Other statuses fail with
	/// [`ApiError`](crate::error::ApiError).
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		obs::observe(OpKind::Request, "send", self.execute(&request)).await
	}

	/// Executes a request and decodes the JSON body.
	///
	/// An unfollowed second redirect fails with
	/// [`RedirectError::UnfollowedRedirect`](crate::error::RedirectError::UnfollowedRedirect).
	pub async fn request<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let response = self.send(request).await?;

		Session::decode(&response)
	}

	/// `GET path` decoded as JSON.
	pub async fn get<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(ApiRequest::get(path)).await
	}

	/// `POST path` with a JSON body, decoded as JSON.
	pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.request(ApiRequest::post(path).json(body)?).await
	}

	/// `PUT path` with a JSON body, decoded as JSON.
	pub async fn put<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.request(ApiRequest::put(path).json(body)?).await
	}

	/// `DELETE path`; the raw response is returned since bodies are usually empty.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.send(ApiRequest::delete(path)).await
	}

	/// Executes a request that must answer with a redirect and returns its `Location`
	/// verbatim, without following it.
	pub async fn redirect_location(&self, request: ApiRequest) -> Result<String> {
		obs::observe(OpKind::RedirectLocation, "redirect_location", async {
			let response = self.execute_once(&request).await?;

			Session::redirect_target(&response)
		})
		.await
	}

	/// Eagerly collects a paginated collection.
	///
	/// Pages are fetched in cursor order until one has no `next` or at least `max` items were
	/// collected (`max == 0` is unbounded). Pages are never truncated. The first failing
	/// fetch discards everything collected so far.
	pub async fn list<R>(&self, first: ApiRequest, max: usize) -> Result<Vec<R>>
	where
		R: DeserializeOwned,
	{
		let mut cursor = PageCursor::new(first);
		let mut items = Vec::new();

		loop {
			match cursor.step() {
				pagination::CursorStep::Item(item) => items.push(item),
				pagination::CursorStep::Fetch(request)
					if pagination::wants_more(items.len(), max) =>
					cursor.absorb(self.fetch_page(request).await?),
				_ => return Ok(items),
			}
		}
	}

	/// Lazily streams a paginated collection, one item at a time.
	///
	/// Creating the stream performs no I/O; each page is fetched only once the previous one
	/// has been drained and the consumer polls again.
	pub fn pages<'a, R>(&'a self, first: ApiRequest) -> impl Stream<Item = Result<R>> + 'a
	where
		R: 'a + DeserializeOwned,
	{
		pagination::page_stream(first, move |request| self.fetch_page(request))
	}

	/// [`Client::pages`] with external cancellation.
	///
	/// Aborting the paired [`AbortHandle`](futures::stream::AbortHandle) drops the in-flight
	/// fetch; the stream then ends and never fetches another page. Items already yielded
	/// stay valid.
	pub fn pages_with_abort<'a, R>(
		&'a self,
		first: ApiRequest,
		registration: AbortRegistration,
	) -> Abortable<impl Stream<Item = Result<R>> + 'a>
	where
		R: 'a + DeserializeOwned,
	{
		Abortable::new(self.pages(first), registration)
	}

	/// OAuth 1.0a step one: obtains a request token.
	///
	/// Restarts the handshake; any failure leaves it at the initial stage.
	pub async fn request_token(&self) -> Result<RequestToken> {
		obs::observe(OpKind::RequestToken, "request_token", async {
			let handshake = self.session.three_legged("request_token")?;
			let url = &self.session.endpoints.request_token;
			let authorization = handshake.sign_request_token(url, self.session.now())?;
			let request = self.session.handshake_request(url, &authorization)?;
			let response = self.dispatch(request).await?;

			handshake.accept_request_token(response.status, &response.body)
		})
		.await
	}

	/// OAuth 1.0a step two: the URL the user visits to authorize the request token.
	pub fn authorization_url(&self) -> Result<Url> {
		self.session
			.three_legged("authorization_url")?
			.authorization_url(&self.session.endpoints.authorize)
	}

	/// OAuth 1.0a step three: exchanges the verifier (PIN) for an access token.
	///
	/// Subsequent calls are signed with the new token. Any failure discards the handshake.
	pub async fn authenticate_with_pin(&self, verifier: &str) -> Result<OAuth1Token> {
		obs::observe(OpKind::AccessToken, "authenticate_with_pin", async {
			let handshake = self.session.three_legged("access_token")?;
			let url = &self.session.endpoints.access_token;
			let authorization = handshake.sign_access_token(url, verifier, self.session.now())?;
			let request = self.session.handshake_request(url, &authorization)?;
			let response = self.dispatch(request).await.inspect_err(|_| handshake.reset())?;

			handshake.accept_access_token(response.status, &response.body)
		})
		.await
	}

	async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let response = self.execute_once(request).await?;

		match self.session.follow_up(request, &response)? {
			Some(next) => {
				let response =
					obs::observe(OpKind::Redirect, "follow", self.execute_once(&next)).await?;

				Session::finish(response, true)
			},
			None => Session::finish(response, false),
		}
	}

	async fn execute_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
		self.refresh_token().await?;

		let mut http = self.session.build(request)?;

		self.session.authorize(&mut http)?;

		self.dispatch(http).await
	}

	async fn refresh_token(&self) -> Result<()> {
		let Some(request) = self.session.refresh_request()? else {
			return Ok(());
		};

		obs::observe(OpKind::TokenRefresh, "refresh_token", async {
			let response = self.dispatch(request).await?;

			self.session.accept_refresh(&response)
		})
		.await
	}

	async fn fetch_page<R>(&self, request: ApiRequest) -> Result<Page<R>>
	where
		R: DeserializeOwned,
	{
		obs::observe(OpKind::PageFetch, "fetch_page", async {
			let response = self.execute(&request).await?;

			Session::decode(&response)
		})
		.await
	}

	async fn dispatch(&self, request: HttpRequest) -> Result<ApiResponse> {
		self.transport
			.send(request)
			.await
			.map(ApiResponse::from)
			.map_err(|e| TransportError::network(e).into())
	}
}
