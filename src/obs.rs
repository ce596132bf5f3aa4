//! Optional observability helpers for client operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `bitbucket_rest.op` with the `op`
//!   (operation kind), `stage` (call site), and `outcome` fields. Failures are also logged
//!   at `debug` level with the error message.
//! - Enable `metrics` to increment the `bitbucket_rest_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// A full API call, including at most one redirect hop.
	Request,
	/// The single follow-up request issued for a redirect.
	Redirect,
	/// Redirect resolution without following (`redirect_location`).
	RedirectLocation,
	/// OAuth 2.0 token fetch or refresh.
	TokenRefresh,
	/// OAuth 1.0a request-token step.
	RequestToken,
	/// OAuth 1.0a access-token step.
	AccessToken,
	/// One page fetch during pagination.
	PageFetch,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Request => "request",
			OpKind::Redirect => "redirect",
			OpKind::RedirectLocation => "redirect_location",
			OpKind::TokenRefresh => "token_refresh",
			OpKind::RequestToken => "request_token",
			OpKind::AccessToken => "access_token",
			OpKind::PageFetch => "page_fetch",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs an async operation inside an [`OpSpan`], recording attempt and outcome.
pub(crate) async fn observe<F, T>(kind: OpKind, stage: &'static str, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	let span = OpSpan::new(kind, stage);

	record_op_outcome(kind, OpOutcome::Attempt);

	let result = span.instrument(fut).await;

	record_result(kind, &span, &result);

	result
}

/// Blocking counterpart of [`observe`].
pub(crate) fn observe_blocking<F, T>(kind: OpKind, stage: &'static str, f: F) -> Result<T>
where
	F: FnOnce() -> Result<T>,
{
	let span = OpSpan::new(kind, stage);
	let result = {
		let _guard = span.enter();

		record_op_outcome(kind, OpOutcome::Attempt);

		f()
	};

	record_result(kind, &span, &result);

	result
}

fn record_result<T>(kind: OpKind, span: &OpSpan, result: &Result<T>) {
	let outcome = match result {
		Ok(_) => OpOutcome::Success,
		Err(_e) => {
			#[cfg(feature = "tracing")]
			::tracing::debug!(op = kind.as_str(), error = %_e, "operation failed");

			OpOutcome::Failure
		},
	};

	span.record_outcome(outcome);
	record_op_outcome(kind, outcome);
}
