//! Client-level error types shared across signing, handshakes, execution, and pagination.

// std
use std::borrow::Cow;
// self
use crate::{_prelude::*, auth::HandshakeStage};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Connectivity or timeout failure reported by the transport.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Signing preconditions, handshake ordering, or token endpoint rejection.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Non-success HTTP response from the API.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Redirect handling could not complete.
	#[error(transparent)]
	Redirect(#[from] RedirectError),
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Requested signature method has no implementation.
	#[error("Signature method {method} is not supported.")]
	NotSupported {
		/// Signature method label (e.g., `RSA-SHA1`).
		method: &'static str,
	},
	/// Response body could not be decoded into the requested shape.
	#[error("Response body could not be decoded (HTTP {status}).")]
	Decode {
		/// Structured decoding failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status of the decoded response.
		status: u16,
	},
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Authentication failures. Never retried automatically.
#[derive(Debug, ThisError)]
pub enum AuthenticationError {
	/// A signed call was attempted before an access token exists.
	#[error("No access token is available to sign the request.")]
	MissingAccessToken,
	/// A handshake step was invoked out of order.
	#[error("The {step} step cannot run while the handshake is at stage `{stage}`.")]
	HandshakeOrder {
		/// Step the caller attempted.
		step: &'static str,
		/// Stage the handshake was in.
		stage: HandshakeStage,
	},
	/// Token endpoint answered with an unexpected status.
	#[error("Token endpoint rejected the request with HTTP {status}: {body}")]
	TokenEndpoint {
		/// HTTP status code returned by the endpoint.
		status: u16,
		/// Raw response body.
		body: String,
	},
	/// Token endpoint answered 200 but the payload is unusable.
	#[error("Token endpoint returned a malformed response: {reason}")]
	MalformedTokenResponse {
		/// Description of the missing or invalid field.
		reason: String,
	},
	/// Token material failed validation.
	#[error(transparent)]
	InvalidToken(#[from] crate::auth::TokenError),
}

/// Non-2xx API response.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("API request failed with HTTP {status}: {body}")]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: String,
}
impl ApiError {
	/// Creates a new API error from a status and raw body.
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self { status, body: body.into() }
	}

	/// Extracts a human readable message from Bitbucket's error payloads.
	///
	/// Bitbucket Cloud reports `{"type": "error", "error": {"message": ".."}}`, Server/DC
	/// reports `{"errors": [{"message": ".."}]}`; a few endpoints use `error.detail` or a
	/// top-level `message`. Falls back to the raw body.
	pub fn message(&self) -> Cow<'_, str> {
		let Ok(json) = serde_json::from_str::<serde_json::Value>(&self.body) else {
			return Cow::Borrowed(&self.body);
		};
		let found = json
			.get("error")
			.and_then(|e| e.get("message"))
			.or_else(|| {
				json.get("errors")
					.and_then(|e| e.as_array())
					.and_then(|arr| arr.first())
					.and_then(|e| e.get("message"))
			})
			.or_else(|| json.get("error").and_then(|e| e.get("detail")))
			.or_else(|| json.get("message"))
			.and_then(|m| m.as_str());

		match found {
			Some(message) => Cow::Owned(message.to_owned()),
			None => Cow::Borrowed(&self.body),
		}
	}
}

/// Redirect protocol failures.
#[derive(Debug, ThisError)]
pub enum RedirectError {
	/// A redirect was expected but the response was something else.
	#[error("Expected a redirect response, got HTTP {status}.")]
	NotRedirect {
		/// Status actually received.
		status: u16,
	},
	/// Redirect response without a usable `Location` header.
	#[error("Redirect response (HTTP {status}) is missing a usable Location header.")]
	MissingLocation {
		/// Redirect status received.
		status: u16,
	},
	/// `Location` header could not be resolved into a URL.
	#[error("Redirect location `{location}` is invalid.")]
	InvalidLocation {
		/// Raw header value.
		location: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The single followed hop produced another redirect and a typed body was requested.
	#[error("Redirect target answered with another redirect (HTTP {status}) to `{location}`.")]
	UnfollowedRedirect {
		/// Second redirect status.
		status: u16,
		/// Second redirect target, verbatim.
		location: String,
	},
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A header value contained characters HTTP does not allow.
	#[error("Header value is invalid.")]
	InvalidHeader(#[from] oauth2::http::header::InvalidHeaderValue),
	/// Request target could not be turned into a URL.
	#[error("Request URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending URL or path.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized as JSON.
	#[error("Request body could not be serialized.")]
	EncodeBody(#[source] serde_json::Error),
	/// Endpoint descriptor failed validation.
	#[error(transparent)]
	Endpoints(#[from] crate::endpoint::EndpointsError),
	/// The operation needs a different authenticator variant than the one configured.
	#[error("The {operation} operation requires the {required} authenticator, not {configured}.")]
	AuthenticatorMismatch {
		/// Operation that was attempted.
		operation: &'static str,
		/// Authenticator variant the operation needs.
		required: &'static str,
		/// Authenticator variant bound to the client.
		configured: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn api_error_message_reads_cloud_and_server_shapes() {
		let cloud =
			ApiError::new(404, r#"{"type":"error","error":{"message":"Repository not found"}}"#);

		assert_eq!(cloud.message(), "Repository not found");

		let server = ApiError::new(400, r#"{"errors":[{"message":"Branch is locked"}]}"#);

		assert_eq!(server.message(), "Branch is locked");

		let detail = ApiError::new(403, r#"{"error":{"detail":"Access denied"}}"#);

		assert_eq!(detail.message(), "Access denied");
	}

	#[test]
	fn api_error_message_falls_back_to_raw_body() {
		let err = ApiError::new(404, "not found");

		assert_eq!(err.message(), "not found");
		assert_eq!(err.body, "not found");
		assert_eq!(err.status, 404);
	}
}
