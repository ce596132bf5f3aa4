// self
use crate::{
	_prelude::*,
	obs::{OpKind, OpOutcome},
};

/// Future returned by [`OpSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OpSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// `bitbucket_rest.op` span covering one client operation.
///
/// Carries `op` and `stage` from creation; `outcome` is filled in once the operation
/// finishes.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens a span for `kind` at call site `stage`.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self {
				span: tracing::info_span!(
					"bitbucket_rest.op",
					op = kind.as_str(),
					stage,
					outcome = tracing::field::Empty
				),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Records how the operation ended.
	pub fn record_outcome(&self, outcome: OpOutcome) {
		#[cfg(feature = "tracing")]
		self.span.record("outcome", outcome.as_str());
		#[cfg(not(feature = "tracing"))]
		let _ = outcome;
	}

	/// Enters the span on the current thread, for blocking operations.
	pub fn enter(&self) -> OpSpanGuard<'_> {
		OpSpanGuard {
			#[cfg(feature = "tracing")]
			_entered: self.span.enter(),
			_span: PhantomData,
		}
	}

	/// Attaches the span to a future; it is entered on every poll, never across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			tracing::Instrument::instrument(fut, self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Guard returned by [`OpSpan::enter`]; exits the span on drop.
pub struct OpSpanGuard<'a> {
	#[cfg(feature = "tracing")]
	_entered: tracing::span::Entered<'a>,
	_span: PhantomData<&'a OpSpan>,
}
impl Debug for OpSpanGuard<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OpSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn blocking_guard_works_without_subscriber() {
		let span = OpSpan::new(OpKind::Request, "send");
		let guard = span.enter();

		span.record_outcome(OpOutcome::Success);

		assert_eq!(format!("{guard:?}"), "OpSpanGuard(..)");
	}

	#[tokio::test]
	async fn instrumented_fetch_passes_output_through() {
		let span = OpSpan::new(OpKind::PageFetch, "fetch_page");
		let values = span.instrument(async { vec![1, 2] }).await;

		span.record_outcome(OpOutcome::Failure);

		assert_eq!(values, [1, 2]);
	}
}
