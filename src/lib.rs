//! Authenticated request execution core for the Bitbucket REST API.
//!
//! Covers OAuth 1.0a signatures and handshakes, refreshing OAuth 2.0 client-credentials
//! sessions, single-hop redirect resolution, and lazy cursor pagination. [`Client`] drives
//! an async transport and [`BlockingClient`] a blocking one; both share one execution core.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod blocking;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod obs;
pub mod pagination;
pub mod signature;

mod session;

pub use blocking::BlockingClient;
pub use client::Client;

mod _prelude {
	pub use std::{
		collections::VecDeque,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		marker::PhantomData,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use oauth2::{
		HttpRequest, HttpResponse,
		http::{HeaderMap, HeaderValue, Method, StatusCode, header},
	};
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
