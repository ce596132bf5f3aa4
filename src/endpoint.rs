//! Endpoint descriptor for a Bitbucket deployment.
//!
//! [`Endpoints`] holds the validated URLs a client talks to: the REST API base, the OAuth
//! 1.0a request-token / authorize / access-token endpoints, and the OAuth 2.0 token
//! endpoint. Build one with [`Endpoints::builder`] or start from
//! [`Endpoints::bitbucket_cloud`].

// self
use crate::{_prelude::*, error::ConfigError};

/// Bitbucket Cloud REST API base.
pub const CLOUD_API_BASE: &str = "https://api.bitbucket.org/2.0/";
/// Bitbucket Cloud OAuth 1.0a base.
pub const CLOUD_OAUTH1_BASE: &str = "https://bitbucket.org/api/1.0/";
/// Bitbucket Cloud OAuth 2.0 token endpoint.
pub const CLOUD_OAUTH2_TOKEN: &str = "https://bitbucket.org/site/oauth2/access_token";

/// Errors raised while validating endpoint descriptors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum EndpointsError {
	/// A URL failed to parse.
	#[error("The {endpoint} endpoint `{url}` is not a valid URL: {reason}.")]
	InvalidUrl {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Offending value.
		url: String,
		/// Parser message.
		reason: String,
	},
	/// Only `http` and `https` are supported.
	#[error("The {endpoint} endpoint must use http or https: {url}.")]
	UnsupportedScheme {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Offending value.
		url: String,
	},
	/// Base URLs must be hierarchical so relative paths can be joined onto them.
	#[error("The {endpoint} endpoint cannot be used as a base URL: {url}.")]
	NotABase {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Offending value.
		url: String,
	},
}

/// Validated endpoint set consumed by clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
	/// REST API base, always ending with `/`.
	pub api_base: Url,
	/// OAuth 1.0a request-token endpoint.
	pub request_token: Url,
	/// OAuth 1.0a user authorization page.
	pub authorize: Url,
	/// OAuth 1.0a access-token endpoint.
	pub access_token: Url,
	/// OAuth 2.0 token endpoint.
	pub oauth2_token: Url,
}
impl Endpoints {
	/// Creates a builder seeded with the Bitbucket Cloud defaults.
	pub fn builder() -> EndpointsBuilder {
		EndpointsBuilder::default()
	}

	/// Bitbucket Cloud endpoints.
	pub fn bitbucket_cloud() -> Result<Self, EndpointsError> {
		Self::builder().build()
	}

	/// Resolves a request path: absolute URLs are used verbatim, anything else is joined
	/// onto the API base.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		match Url::parse(path) {
			Ok(url) => Ok(url),
			Err(url::ParseError::RelativeUrlWithoutBase) => self
				.api_base
				.join(path.trim_start_matches('/'))
				.map_err(|source| ConfigError::InvalidUrl { url: path.to_owned(), source }),
			Err(source) => Err(ConfigError::InvalidUrl { url: path.to_owned(), source }),
		}
	}

	/// Returns `url` relative to the API base, or `None` when it points elsewhere.
	pub fn relative_to_api(&self, url: &Url) -> Option<String> {
		url.as_str().strip_prefix(self.api_base.as_str()).map(ToOwned::to_owned)
	}
}

/// Builder for [`Endpoints`].
#[derive(Clone, Debug)]
pub struct EndpointsBuilder {
	api_base: String,
	oauth1_base: String,
	request_token_path: String,
	authorize_path: String,
	access_token_path: String,
	oauth2_token: String,
}
impl EndpointsBuilder {
	/// Sets the REST API base.
	pub fn api_base(mut self, url: impl Into<String>) -> Self {
		self.api_base = url.into();

		self
	}

	/// Sets the base the OAuth 1.0a paths are joined onto.
	pub fn oauth1_base(mut self, url: impl Into<String>) -> Self {
		self.oauth1_base = url.into();

		self
	}

	/// Sets the request-token path, relative to the OAuth 1.0a base.
	pub fn request_token_path(mut self, path: impl Into<String>) -> Self {
		self.request_token_path = path.into();

		self
	}

	/// Sets the authorization page path, relative to the OAuth 1.0a base.
	pub fn authorize_path(mut self, path: impl Into<String>) -> Self {
		self.authorize_path = path.into();

		self
	}

	/// Sets the access-token path, relative to the OAuth 1.0a base.
	pub fn access_token_path(mut self, path: impl Into<String>) -> Self {
		self.access_token_path = path.into();

		self
	}

	/// Sets the OAuth 2.0 token endpoint.
	pub fn oauth2_token(mut self, url: impl Into<String>) -> Self {
		self.oauth2_token = url.into();

		self
	}

	/// Validates and assembles the endpoint set.
	pub fn build(self) -> Result<Endpoints, EndpointsError> {
		let api_base = parse_base("api_base", &self.api_base)?;
		let oauth1_base = parse_base("oauth1_base", &self.oauth1_base)?;
		let join = |endpoint: &'static str, path: &str| {
			oauth1_base.join(path.trim_start_matches('/')).map_err(|e| EndpointsError::InvalidUrl {
				endpoint,
				url: path.to_owned(),
				reason: e.to_string(),
			})
		};

		Ok(Endpoints {
			request_token: join("request_token", &self.request_token_path)?,
			authorize: join("authorize", &self.authorize_path)?,
			access_token: join("access_token", &self.access_token_path)?,
			oauth2_token: parse_url("oauth2_token", &self.oauth2_token)?,
			api_base,
		})
	}
}
impl Default for EndpointsBuilder {
	fn default() -> Self {
		Self {
			api_base: CLOUD_API_BASE.into(),
			oauth1_base: CLOUD_OAUTH1_BASE.into(),
			request_token_path: "oauth/request_token".into(),
			authorize_path: "oauth/authenticate".into(),
			access_token_path: "oauth/access_token".into(),
			oauth2_token: CLOUD_OAUTH2_TOKEN.into(),
		}
	}
}

fn parse_url(endpoint: &'static str, raw: &str) -> Result<Url, EndpointsError> {
	let url = Url::parse(raw).map_err(|e| EndpointsError::InvalidUrl {
		endpoint,
		url: raw.to_owned(),
		reason: e.to_string(),
	})?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(EndpointsError::UnsupportedScheme { endpoint, url: raw.to_owned() });
	}

	Ok(url)
}

fn parse_base(endpoint: &'static str, raw: &str) -> Result<Url, EndpointsError> {
	let mut url = parse_url(endpoint, raw)?;

	if url.cannot_be_a_base() {
		return Err(EndpointsError::NotABase { endpoint, url: raw.to_owned() });
	}
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cloud_defaults_resolve_every_endpoint() {
		let endpoints = Endpoints::bitbucket_cloud().expect("Cloud defaults should be valid.");

		assert_eq!(endpoints.api_base.as_str(), CLOUD_API_BASE);
		assert_eq!(
			endpoints.request_token.as_str(),
			"https://bitbucket.org/api/1.0/oauth/request_token"
		);
		assert_eq!(
			endpoints.authorize.as_str(),
			"https://bitbucket.org/api/1.0/oauth/authenticate"
		);
		assert_eq!(
			endpoints.access_token.as_str(),
			"https://bitbucket.org/api/1.0/oauth/access_token"
		);
		assert_eq!(endpoints.oauth2_token.as_str(), CLOUD_OAUTH2_TOKEN);
	}

	#[test]
	fn bases_gain_trailing_slash() {
		let endpoints = Endpoints::builder()
			.api_base("https://bitbucket.example.com/rest/api/1.0")
			.build()
			.expect("Server base should be valid.");

		assert_eq!(endpoints.api_base.as_str(), "https://bitbucket.example.com/rest/api/1.0/");
		assert_eq!(
			endpoints
				.resolve("projects/ACME/repos")
				.expect("Relative path should resolve.")
				.as_str(),
			"https://bitbucket.example.com/rest/api/1.0/projects/ACME/repos"
		);
		assert_eq!(
			endpoints.resolve("/projects").expect("Leading slash should resolve.").as_str(),
			"https://bitbucket.example.com/rest/api/1.0/projects"
		);
	}

	#[test]
	fn absolute_paths_bypass_the_base() {
		let endpoints = Endpoints::bitbucket_cloud().expect("Cloud defaults should be valid.");
		let next = endpoints
			.resolve("https://api.bitbucket.org/2.0/repositories?page=2")
			.expect("Absolute URL should resolve.");

		assert_eq!(endpoints.relative_to_api(&next).as_deref(), Some("repositories?page=2"));

		let elsewhere = endpoints.resolve("https://x/y").expect("Absolute URL should resolve.");

		assert_eq!(endpoints.relative_to_api(&elsewhere), None);
	}

	#[test]
	fn invalid_endpoints_are_rejected() {
		assert!(matches!(
			Endpoints::builder().api_base("ftp://bitbucket.org/").build(),
			Err(EndpointsError::UnsupportedScheme { endpoint: "api_base", .. })
		));
		assert!(matches!(
			Endpoints::builder().oauth2_token("not a url").build(),
			Err(EndpointsError::InvalidUrl { endpoint: "oauth2_token", .. })
		));
	}
}
