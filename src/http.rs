//! Transport seam plus the request and response values exchanged with it.
//!
//! Clients depend on a transport only through [`AsyncTransport`] or [`BlockingTransport`].
//! Both are blanket-implemented for the `oauth2` crate's [`AsyncHttpClient`] and
//! [`SyncHttpClient`] traits, so any client speaking [`HttpRequest`]/[`HttpResponse`]
//! (including plain closures) plugs in directly. Transports must not follow redirects
//! themselves; the executor resolves at most one hop on its own.

// crates.io
use oauth2::{AsyncHttpClient, SyncHttpClient};
// self
use crate::{_prelude::*, error::ConfigError};

/// Boxed future returned by [`AsyncTransport::send`].
pub type TransportFuture<'a, E> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, E>> + 'a + Send>>;

/// Asynchronous HTTP transport.
///
/// Implementations are shared by reference across calls, so they must be `Send + Sync`, and
/// the returned future must be `Send` so client futures can hop executors.
pub trait AsyncTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends one request and resolves with the raw response.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError>;
}
impl<C, E> AsyncTransport for C
where
	C: 'static + Send + Sync + for<'c> AsyncHttpClient<'c, Error = E, Future: 'c + Send>,
	E: 'static + Send + Sync + StdError,
{
	type TransportError = E;

	fn send<'a>(&'a self, request: HttpRequest) -> TransportFuture<'a, Self::TransportError> {
		Box::pin(<C as AsyncHttpClient<'a>>::call(self, request))
	}
}

/// Blocking HTTP transport.
pub trait BlockingTransport
where
	Self: Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends one request on the caller's thread.
	fn send(&self, request: HttpRequest) -> Result<HttpResponse, Self::TransportError>;
}
impl<C> BlockingTransport for C
where
	C: Send + Sync + SyncHttpClient,
	C::Error: Send + Sync,
{
	type TransportError = C::Error;

	fn send(&self, request: HttpRequest) -> Result<HttpResponse, Self::TransportError> {
		<C as SyncHttpClient>::call(self, request)
	}
}

/// Async reqwest transport with automatic redirects disabled.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a reqwest client that never follows redirects.
	pub fn new() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(Self(client))
	}

	/// Wraps an existing client. It must be configured with `redirect::Policy::none()`.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestTransport {
	type Error = ReqwestError;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			let response = self.0.execute(request.try_into()?).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Blocking reqwest transport with automatic redirects disabled.
///
/// Like any `reqwest::blocking` client it must not be created or used inside an async
/// runtime.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct BlockingReqwestTransport(reqwest::blocking::Client);
#[cfg(feature = "reqwest")]
impl BlockingReqwestTransport {
	/// Builds a blocking reqwest client that never follows redirects.
	pub fn new() -> Result<Self> {
		let client = reqwest::blocking::Client::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(Self(client))
	}

	/// Wraps an existing client. It must be configured with `redirect::Policy::none()`.
	pub fn with_client(client: reqwest::blocking::Client) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl SyncHttpClient for BlockingReqwestTransport {
	type Error = ReqwestError;

	fn call(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
		let (parts, body) = request.into_parts();
		let response = self
			.0
			.request(parts.method, parts.uri.to_string())
			.headers(parts.headers)
			.body(body)
			.send()?;
		let status = response.status();
		let headers = response.headers().to_owned();
		let mut response_new = HttpResponse::new(response.bytes()?.to_vec());

		*response_new.status_mut() = status;
		*response_new.headers_mut() = headers;

		Ok(response_new)
	}
}

/// Single query or form parameter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
	/// Sent once.
	Scalar(String),
	/// Expanded into one entry per element.
	Sequence(Vec<String>),
}
impl From<&str> for ParamValue {
	fn from(value: &str) -> Self {
		Self::Scalar(value.to_owned())
	}
}
impl From<String> for ParamValue {
	fn from(value: String) -> Self {
		Self::Scalar(value)
	}
}
impl From<&String> for ParamValue {
	fn from(value: &String) -> Self {
		Self::Scalar(value.clone())
	}
}
impl From<bool> for ParamValue {
	fn from(value: bool) -> Self {
		Self::Scalar(if value { "true" } else { "false" }.to_owned())
	}
}
impl<T> From<Vec<T>> for ParamValue
where
	T: Into<String>,
{
	fn from(values: Vec<T>) -> Self {
		Self::Sequence(values.into_iter().map(Into::into).collect())
	}
}
impl From<&[&str]> for ParamValue {
	fn from(values: &[&str]) -> Self {
		Self::Sequence(values.iter().map(|value| (*value).to_owned()).collect())
	}
}
macro_rules! impl_param_value_from_number {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for ParamValue {
				fn from(value: $ty) -> Self {
					Self::Scalar(value.to_string())
				}
			}
		)*
	};
}
impl_param_value_from_number!(i32, i64, u16, u32, u64, usize);

/// Ordered, flat parameter map.
///
/// Names are unique: inserting an existing name replaces its value in place, preserving
/// the original position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, ParamValue)>);
impl Params {
	/// Creates an empty map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or replaces a parameter.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
		let name = name.into();
		let value = value.into();

		match self.0.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, slot)) => *slot = value,
			None => self.0.push((name, value)),
		}
	}

	/// Appends a value, turning an existing scalar into a sequence.
	pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();

		match self.0.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, slot)) => {
				let mut values = match std::mem::replace(slot, ParamValue::Sequence(Vec::new())) {
					ParamValue::Scalar(first) => vec![first],
					ParamValue::Sequence(values) => values,
				};

				values.push(value);

				*slot = ParamValue::Sequence(values);
			},
			None => self.0.push((name, ParamValue::Scalar(value))),
		}
	}

	/// Looks up a parameter by name.
	pub fn get(&self, name: &str) -> Option<&ParamValue> {
		self.0.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
	}

	/// Returns `true` when no parameters are set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Number of distinct names.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Flattens the map into `(name, value)` pairs, expanding sequences into repeated entries.
	pub fn pairs(&self) -> Vec<(&str, &str)> {
		self.0
			.iter()
			.flat_map(|(name, value)| match value {
				ParamValue::Scalar(value) => vec![(name.as_str(), value.as_str())],
				ParamValue::Sequence(values) =>
					values.iter().map(|value| (name.as_str(), value.as_str())).collect(),
			})
			.collect()
	}
}
impl<K, V> FromIterator<(K, V)> for Params
where
	K: Into<String>,
	V: Into<ParamValue>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut params = Self::new();

		for (name, value) in iter {
			params.insert(name, value);
		}

		params
	}
}

/// Transport-independent description of one API call.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the API base, or an absolute URL.
	pub path: String,
	/// Query parameters.
	pub params: Params,
	/// JSON body; only sent with `PUT` and `POST`.
	pub body: Option<serde_json::Value>,
}
impl ApiRequest {
	/// Creates a request without parameters or body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), params: Params::new(), body: None }
	}

	/// `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Adds or replaces a query parameter.
	pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
		self.params.insert(name, value);

		self
	}

	/// Replaces all query parameters.
	pub fn with_params(mut self, params: Params) -> Self {
		self.params = params;

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_value(body).map_err(ConfigError::EncodeBody)?);

		Ok(self)
	}

	/// Whether a JSON body is attached on the wire for this method.
	pub fn sends_body(&self) -> bool {
		self.body.is_some() && (self.method == Method::POST || self.method == Method::PUT)
	}
}

const REDIRECT_STATUSES: [StatusCode; 5] = [
	StatusCode::MOVED_PERMANENTLY,
	StatusCode::FOUND,
	StatusCode::SEE_OTHER,
	StatusCode::TEMPORARY_REDIRECT,
	StatusCode::PERMANENT_REDIRECT,
];

/// Raw API response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns `true` for 301, 302, 303, 307, and 308.
	pub fn is_redirect(&self) -> bool {
		REDIRECT_STATUSES.contains(&self.status)
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Deserializes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { source, status: self.status.as_u16() })
	}

	/// Header value as a string, if present and valid ASCII.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// `Location` header, verbatim.
	pub fn location(&self) -> Option<&str> {
		self.header(header::LOCATION.as_str()).filter(|location| !location.trim().is_empty())
	}
}
impl From<HttpResponse> for ApiResponse {
	fn from(response: HttpResponse) -> Self {
		let (parts, body) = response.into_parts();

		Self { status: parts.status, headers: parts.headers, body }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn sequences_expand_into_repeated_pairs() {
		let mut params = Params::new();

		params.insert("q", "state=\"OPEN\"");
		params.insert("fields", vec!["values.id", "next"]);
		params.insert("pagelen", 50_u32);
		params.insert("q", "state=\"MERGED\"");

		assert_eq!(params.len(), 3);
		assert_eq!(
			params.pairs(),
			[
				("q", "state=\"MERGED\""),
				("fields", "values.id"),
				("fields", "next"),
				("pagelen", "50"),
			]
		);
	}

	#[test]
	fn append_promotes_scalars_to_sequences() {
		let mut params = Params::new();

		params.append("a", "1");
		params.append("a", "2");
		params.append("b", "x");

		assert_eq!(params.get("a"), Some(&ParamValue::Sequence(vec!["1".into(), "2".into()])));
		assert_eq!(params.get("b"), Some(&ParamValue::Scalar("x".into())));
	}

	#[test]
	fn bodies_only_travel_with_put_and_post() {
		let body = serde_json::json!({ "name": "demo" });
		let post = ApiRequest::post("repositories/acme/demo")
			.json(&body)
			.expect("Body should encode.");
		let get =
			ApiRequest::get("repositories/acme/demo").json(&body).expect("Body should encode.");

		assert!(post.sends_body());
		assert!(!get.sends_body());
	}

	#[test]
	fn responses_expose_location_and_json() {
		let mut raw = HttpResponse::new(br#"{"values":[1]}"#.to_vec());

		*raw.status_mut() = StatusCode::FOUND;
		raw.headers_mut().insert(header::LOCATION, HeaderValue::from_static("https://x/y?a=1"));

		let response = ApiResponse::from(raw);

		assert!(response.is_redirect());
		assert_eq!(response.location(), Some("https://x/y?a=1"));

		let value: serde_json::Value = response.json().expect("Body should decode.");

		assert_eq!(value["values"][0], 1);
	}

	#[test]
	fn decode_errors_report_path_and_status() {
		#[derive(Debug, Deserialize)]
		struct Repo {
			#[allow(dead_code)]
			slug: String,
		}

		let mut raw = HttpResponse::new(br#"{"slug":42}"#.to_vec());

		*raw.status_mut() = StatusCode::OK;

		let err = ApiResponse::from(raw).json::<Repo>().expect_err("Type mismatch should fail.");

		match err {
			Error::Decode { source, status } => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "slug");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}
