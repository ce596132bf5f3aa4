//! OAuth 1.0a request signatures computed from first principles.
//!
//! [`sign`] is a pure function: fixed inputs (URL, credentials, method, timestamp, nonce)
//! always yield the same [`Signature`]. Nonces and timestamps are produced by the caller,
//! typically through an injected [`NonceSource`] and the client's clock, so tests can pin
//! every input.
//!
//! HMAC-SHA1 follows the classic base-string construction:
//!
//! 1. Collect every non-`oauth_*` query parameter of the URL.
//! 2. Append the OAuth protocol parameters (`oauth_version`, `oauth_nonce`, `oauth_timestamp`,
//!    `oauth_signature_method`, `oauth_consumer_key`, and `oauth_token` when present).
//! 3. Sort by name, then by value, using ordinal byte comparison.
//! 4. Percent-encode names and values with the RFC 3986 unreserved set.
//! 5. Join `METHOD&encode(normalized_url)&encode(normalized_params)` and HMAC it with
//!    `encode(consumer_secret)&encode(token_secret)`.

// std
use std::cmp::Ordering;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use rand::{Rng, SeedableRng, rngs::StdRng};
use ring::hmac;
// self
use crate::_prelude::*;

/// Characters left untouched by [`percent_encode`]: `A-Z a-z 0-9 - _ . ~`.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');
/// Lower bound (inclusive) of the nonce window.
pub const NONCE_MIN: u32 = 123_400;
/// Upper bound (exclusive) of the nonce window.
pub const NONCE_MAX: u32 = 9_999_999;
/// Protocol version advertised in `oauth_version`.
pub const OAUTH_VERSION: &str = "1.0";

/// Signature methods recognised by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureMethod {
	/// `HMAC-SHA1`, the default.
	#[default]
	#[serde(rename = "HMAC-SHA1")]
	HmacSha1,
	/// `PLAINTEXT`: the encoded secrets travel as the signature.
	#[serde(rename = "PLAINTEXT")]
	Plaintext,
	/// `RSA-SHA1`: declared by the protocol but not implemented; signing fails.
	#[serde(rename = "RSA-SHA1")]
	RsaSha1,
}
impl SignatureMethod {
	/// Returns the protocol label sent in `oauth_signature_method`.
	pub const fn as_str(self) -> &'static str {
		match self {
			SignatureMethod::HmacSha1 => "HMAC-SHA1",
			SignatureMethod::Plaintext => "PLAINTEXT",
			SignatureMethod::RsaSha1 => "RSA-SHA1",
		}
	}
}
impl Display for SignatureMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for SignatureMethod {
	type Err = UnknownSignatureMethod;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"HMAC-SHA1" => Ok(Self::HmacSha1),
			"PLAINTEXT" => Ok(Self::Plaintext),
			"RSA-SHA1" => Ok(Self::RsaSha1),
			other => Err(UnknownSignatureMethod(other.to_owned())),
		}
	}
}

/// Error returned when parsing an unrecognised signature method label.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown signature method `{0}`.")]
pub struct UnknownSignatureMethod(pub String);

/// Inputs to [`sign`].
#[derive(Clone, Debug)]
pub struct SignatureRequest<'a> {
	/// Absolute request URL, including any query parameters.
	pub url: &'a Url,
	/// HTTP method; upper-cased in the base string.
	pub http_method: &'a str,
	/// Consumer key identifying the application.
	pub consumer_key: &'a str,
	/// Consumer secret.
	pub consumer_secret: &'a str,
	/// Request or access token, when one exists.
	pub token: Option<&'a str>,
	/// Secret paired with `token`.
	pub token_secret: Option<&'a str>,
	/// UNIX seconds, as a decimal string.
	pub timestamp: &'a str,
	/// One-time value.
	pub nonce: &'a str,
	/// Signature method.
	pub method: SignatureMethod,
	/// Extra protocol parameters such as `oauth_callback` or `oauth_verifier`.
	pub extra: Vec<(&'static str, &'a str)>,
}
impl<'a> SignatureRequest<'a> {
	/// Creates a request signed with HMAC-SHA1 and no token.
	pub fn new(
		url: &'a Url,
		http_method: &'a str,
		consumer_key: &'a str,
		consumer_secret: &'a str,
		timestamp: &'a str,
		nonce: &'a str,
	) -> Self {
		Self {
			url,
			http_method,
			consumer_key,
			consumer_secret,
			token: None,
			token_secret: None,
			timestamp,
			nonce,
			method: SignatureMethod::default(),
			extra: Vec::new(),
		}
	}

	/// Attaches a token and its secret.
	pub fn with_token(mut self, token: &'a str, secret: &'a str) -> Self {
		self.token = Some(token);
		self.token_secret = Some(secret);

		self
	}

	/// Overrides the signature method.
	pub fn with_method(mut self, method: SignatureMethod) -> Self {
		self.method = method;

		self
	}

	/// Adds an extra protocol parameter (e.g., `oauth_callback`).
	pub fn with_extra(mut self, name: &'static str, value: &'a str) -> Self {
		self.extra.push((name, value));

		self
	}

	/// Protocol parameters that accompany the signature, sorted by name then value.
	pub fn oauth_parameters(&self) -> Vec<(String, String)> {
		let mut params = vec![
			("oauth_version".to_owned(), OAUTH_VERSION.to_owned()),
			("oauth_nonce".to_owned(), self.nonce.to_owned()),
			("oauth_timestamp".to_owned(), self.timestamp.to_owned()),
			("oauth_signature_method".to_owned(), self.method.as_str().to_owned()),
			("oauth_consumer_key".to_owned(), self.consumer_key.to_owned()),
		];

		if let Some(token) = self.token.filter(|token| !token.is_empty()) {
			params.push(("oauth_token".to_owned(), token.to_owned()));
		}

		for (name, value) in &self.extra {
			params.push(((*name).to_owned(), (*value).to_owned()));
		}

		params.sort_by(compare_params);

		params
	}
}

/// Output of [`sign`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
	/// Value sent as `oauth_signature`.
	pub value: String,
	/// `scheme://host[:port]path`; empty for PLAINTEXT.
	pub normalized_url: String,
	/// Encoded `name=value` pairs joined by `&`; empty for PLAINTEXT.
	pub normalized_params: String,
}
impl Signature {
	/// Reassembles the signature base string for HMAC signatures.
	pub fn base_string(&self, http_method: &str) -> String {
		format!(
			"{}&{}&{}",
			http_method.to_ascii_uppercase(),
			percent_encode(&self.normalized_url),
			percent_encode(&self.normalized_params)
		)
	}
}

/// Computes the signature for `request`.
pub fn sign(request: &SignatureRequest<'_>) -> Result<Signature> {
	let token_secret = request.token_secret.unwrap_or_default();

	match request.method {
		SignatureMethod::Plaintext => Ok(Signature {
			value: percent_encode(&format!("{}&{}", request.consumer_secret, token_secret)),
			normalized_url: String::new(),
			normalized_params: String::new(),
		}),
		SignatureMethod::RsaSha1 =>
			Err(Error::NotSupported { method: SignatureMethod::RsaSha1.as_str() }),
		SignatureMethod::HmacSha1 => {
			let mut params = request
				.url
				.query_pairs()
				.filter(|(name, _)| !name.starts_with("oauth_"))
				.map(|(name, value)| (name.into_owned(), value.into_owned()))
				.collect::<Vec<_>>();

			params.extend(request.oauth_parameters());
			params.sort_by(compare_params);

			let signature = Signature {
				value: String::new(),
				normalized_url: normalize_url(request.url),
				normalized_params: params
					.iter()
					.map(|(name, value)| {
						format!("{}={}", percent_encode(name), percent_encode(value))
					})
					.collect::<Vec<_>>()
					.join("&"),
			};
			let base = signature.base_string(request.http_method);
			let key = format!(
				"{}&{}",
				percent_encode(request.consumer_secret),
				percent_encode(token_secret)
			);
			let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key.as_bytes());
			let tag = hmac::sign(&key, base.as_bytes());

			Ok(Signature { value: STANDARD.encode(tag.as_ref()), ..signature })
		},
	}
}

/// Builds the `Authorization: OAuth ...` header value from protocol parameters and a signature.
pub fn authorization_header(oauth_params: &[(String, String)], signature: &str) -> String {
	let mut params = oauth_params
		.iter()
		.map(|(name, value)| (name.as_str(), value.as_str()))
		.chain([("oauth_signature", signature)])
		.collect::<Vec<_>>();

	params.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));

	let fields = params
		.into_iter()
		.map(|(name, value)| format!("{}=\"{}\"", percent_encode(name), percent_encode(value)))
		.collect::<Vec<_>>()
		.join(", ");

	format!("OAuth {fields}")
}

/// Percent-encodes everything outside `A-Za-z0-9-_.~` as uppercase `%XX` over UTF-8 bytes.
pub fn percent_encode(value: &str) -> String {
	percent_encoding::utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Returns `scheme://host[:port]path`, omitting the port when it is the scheme default.
pub fn normalize_url(url: &Url) -> String {
	let mut normalized = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());

	// `Url::port` already reports `None` for 80/http and 443/https.
	if let Some(port) = url.port() {
		normalized.push_str(&format!(":{port}"));
	}

	normalized.push_str(url.path());

	normalized
}

/// Formats `now` as UNIX seconds.
pub fn timestamp(now: OffsetDateTime) -> String {
	now.unix_timestamp().to_string()
}

fn compare_params(a: &(String, String), b: &(String, String)) -> Ordering {
	a.0.as_bytes().cmp(b.0.as_bytes()).then_with(|| a.1.as_bytes().cmp(b.1.as_bytes()))
}

/// Source of `oauth_nonce` values.
///
/// The default [`RandomNonce`] draws an integer from the fixed window
/// `NONCE_MIN..NONCE_MAX` and formats it in decimal. That window carries roughly 23 bits
/// of entropy, which is a known weakness of this signing scheme; it is kept for wire
/// compatibility with existing consumers.
pub trait NonceSource
where
	Self: Send + Sync,
{
	/// Produces the next nonce.
	fn nonce(&self) -> String;
}

/// Thread-local random nonces in the fixed 7-digit window.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomNonce;
impl NonceSource for RandomNonce {
	fn nonce(&self) -> String {
		rand::rng().random_range(NONCE_MIN..NONCE_MAX).to_string()
	}
}

/// Reproducible nonces drawn from a seeded generator.
#[derive(Debug)]
pub struct SeededNonce(Mutex<StdRng>);
impl SeededNonce {
	/// Creates a generator from a fixed seed.
	pub fn new(seed: u64) -> Self {
		Self(Mutex::new(StdRng::seed_from_u64(seed)))
	}
}
impl NonceSource for SeededNonce {
	fn nonce(&self) -> String {
		self.0.lock().random_range(NONCE_MIN..NONCE_MAX).to_string()
	}
}

/// Always returns the same nonce. Intended for tests and fixture vectors.
#[derive(Clone, Debug)]
pub struct FixedNonce(pub String);
impl FixedNonce {
	/// Wraps a fixed nonce value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}
}
impl NonceSource for FixedNonce {
	fn nonce(&self) -> String {
		self.0.clone()
	}
}
