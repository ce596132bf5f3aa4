//! Shared fixtures for integration tests: a scripted transport and a manually advanced clock.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::Arc,
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime, macros::datetime};
// self
use bitbucket_rest::{
	auth::Clock,
	endpoint::Endpoints,
	oauth2::{
		AsyncHttpClient, HttpRequest, HttpResponse, SyncHttpClient,
		http::{HeaderMap, HeaderValue, Method, StatusCode, header},
	},
};

/// Instant every [`ManualClock`] starts at.
pub const EPOCH: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

/// Endpoints rooted at `https://x/` so redirect targets stay under the API base.
pub fn endpoints() -> Endpoints {
	Endpoints::builder()
		.api_base("https://x/")
		.oauth1_base("https://x/oauth1/")
		.oauth2_token("https://x/oauth2/token")
		.build()
		.expect("Test endpoints should be valid.")
}

/// Endpoints pointing at a mock server.
pub fn endpoints_for(base: &str) -> Endpoints {
	Endpoints::builder()
		.api_base(format!("{base}/2.0/"))
		.oauth1_base(format!("{base}/oauth1/"))
		.oauth2_token(format!("{base}/oauth2/token"))
		.build()
		.expect("Mock endpoints should be valid.")
}

#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	pub fn new() -> Self {
		Self(Arc::new(Mutex::new(EPOCH)))
	}

	/// Moves the clock to `seconds` after [`EPOCH`].
	pub fn set(&self, seconds: i64) {
		*self.0.lock() = EPOCH + Duration::seconds(seconds);
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

#[derive(Debug)]
pub struct ScriptError(pub &'static str);
impl Display for ScriptError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.0)
	}
}
impl StdError for ScriptError {}

/// One scripted transport outcome.
#[derive(Clone, Debug)]
pub enum Reply {
	Respond { status: u16, headers: Vec<(&'static str, String)>, body: Vec<u8> },
	Fail,
	Hang,
}
impl Reply {
	pub fn json(status: u16, body: &str) -> Self {
		Self::Respond {
			status,
			headers: vec![("content-type", "application/json".into())],
			body: body.as_bytes().to_vec(),
		}
	}

	pub fn text(status: u16, body: &str) -> Self {
		Self::Respond { status, headers: Vec::new(), body: body.as_bytes().to_vec() }
	}

	pub fn redirect(status: u16, location: &str) -> Self {
		Self::Respond { status, headers: vec![("location", location.into())], body: Vec::new() }
	}
}

/// Request as seen by the transport.
#[derive(Clone, Debug)]
pub struct Recorded {
	pub method: Method,
	pub url: String,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
}
impl Recorded {
	pub fn authorization(&self) -> &str {
		self.headers
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
	}
}

#[derive(Debug, Default)]
struct Script {
	replies: VecDeque<Reply>,
	recorded: Vec<Recorded>,
}

/// Transport answering from a queue of scripted replies and recording every request.
///
/// Running out of replies fails the request with a transport error.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport(Arc<Mutex<Script>>);
impl ScriptedTransport {
	pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
		let transport = Self::default();

		transport.push(replies);

		transport
	}

	pub fn push(&self, replies: impl IntoIterator<Item = Reply>) {
		self.0.lock().replies.extend(replies);
	}

	pub fn recorded(&self) -> Vec<Recorded> {
		self.0.lock().recorded.clone()
	}

	pub fn calls(&self) -> usize {
		self.0.lock().recorded.len()
	}

	fn next(&self, request: HttpRequest) -> Reply {
		let (parts, body) = request.into_parts();
		let mut script = self.0.lock();

		script.recorded.push(Recorded {
			method: parts.method,
			url: parts.uri.to_string(),
			headers: parts.headers,
			body,
		});

		script.replies.pop_front().unwrap_or(Reply::Fail)
	}
}
impl SyncHttpClient for ScriptedTransport {
	type Error = ScriptError;

	fn call(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
		match self.next(request) {
			Reply::Respond { status, headers, body } => Ok(response(status, headers, body)),
			Reply::Fail => Err(ScriptError("Scripted transport failure.")),
			Reply::Hang => Err(ScriptError("Blocking transports cannot hang.")),
		}
	}
}
impl<'c> AsyncHttpClient<'c> for ScriptedTransport {
	type Error = ScriptError;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let reply = self.next(request);

		Box::pin(async move {
			match reply {
				Reply::Respond { status, headers, body } => Ok(response(status, headers, body)),
				Reply::Fail => Err(ScriptError("Scripted transport failure.")),
				Reply::Hang => futures::future::pending().await,
			}
		})
	}
}

fn response(status: u16, headers: Vec<(&'static str, String)>, body: Vec<u8>) -> HttpResponse {
	let mut response = HttpResponse::new(body);

	*response.status_mut() =
		StatusCode::from_u16(status).expect("Scripted status should be valid.");

	for (name, value) in headers {
		response.headers_mut().insert(
			name,
			HeaderValue::from_str(&value).expect("Scripted header should be valid."),
		);
	}

	response
}

/// Async transport that trusts the self-signed certificates served by `httpmock`.
#[cfg(feature = "reqwest")]
pub fn mock_server_transport() -> bitbucket_rest::http::ReqwestTransport {
	let client = reqwest::Client::builder()
		.redirect(reqwest::redirect::Policy::none())
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Insecure test client should build.");

	bitbucket_rest::http::ReqwestTransport::with_client(client)
}

/// Blocking counterpart of [`mock_server_transport`].
#[cfg(feature = "reqwest")]
pub fn blocking_mock_server_transport() -> bitbucket_rest::http::BlockingReqwestTransport {
	let client = reqwest::blocking::Client::builder()
		.redirect(reqwest::redirect::Policy::none())
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Insecure blocking test client should build.");

	bitbucket_rest::http::BlockingReqwestTransport::with_client(client)
}
