// self
use crate::obs::{OpKind, OpOutcome};

/// Counter incremented once per attempt and once per terminal outcome.
pub const OP_TOTAL: &str = "bitbucket_rest_op_total";

/// Label pairs attached to every [`OP_TOTAL`] increment.
pub fn op_labels(kind: OpKind, outcome: OpOutcome) -> [(&'static str, &'static str); 2] {
	[("op", kind.as_str()), ("outcome", outcome.as_str())]
}

/// Bumps [`OP_TOTAL`] on the global recorder; a no-op without the `metrics` feature.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(OP_TOTAL, &op_labels(kind, outcome)).increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_name_operation_and_outcome() {
		assert_eq!(
			op_labels(OpKind::PageFetch, OpOutcome::Attempt),
			[("op", "page_fetch"), ("outcome", "attempt")]
		);
		assert_eq!(
			op_labels(OpKind::TokenRefresh, OpOutcome::Failure),
			[("op", "token_refresh"), ("outcome", "failure")]
		);

		record_op_outcome(OpKind::TokenRefresh, OpOutcome::Failure);
	}

	#[cfg(feature = "metrics")]
	#[test]
	fn recorder_sees_one_increment_per_call() {
		// std
		use std::sync::{
			Arc,
			atomic::{AtomicU64, Ordering},
		};
		// crates.io
		use ::metrics::{
			Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
		};
		use parking_lot::Mutex;

		#[derive(Default)]
		struct Capture {
			keys: Mutex<Vec<Key>>,
			total: Arc<AtomicU64>,
		}
		impl Recorder for Capture {
			fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

			fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

			fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

			fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
				self.keys.lock().push(key.clone());

				Counter::from_arc(self.total.clone())
			}

			fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
				Gauge::noop()
			}

			fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
				Histogram::noop()
			}
		}

		let capture = Capture::default();

		::metrics::with_local_recorder(&capture, || {
			record_op_outcome(OpKind::Redirect, OpOutcome::Attempt);
			record_op_outcome(OpKind::Redirect, OpOutcome::Success);
		});

		let keys = capture.keys.lock();
		let labels = keys[1]
			.labels()
			.map(|label| (label.key().to_owned(), label.value().to_owned()))
			.collect::<Vec<_>>();

		assert_eq!(capture.total.load(Ordering::Relaxed), 2);
		assert_eq!(keys.len(), 2);
		assert!(keys.iter().all(|key| key.name() == OP_TOTAL));
		assert_eq!(
			labels,
			[("op".to_owned(), "redirect".to_owned()), ("outcome".to_owned(), "success".to_owned())]
		);
	}
}
