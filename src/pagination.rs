//! Cursor pagination over Bitbucket's `{"values": [...], "next": "..."}` pages.
//!
//! [`PageCursor`] is a pull-based state machine holding the buffered items of the current
//! page and the request for the next one. It performs no I/O: [`PageIter`] drives it with a
//! blocking fetch and [`page_stream`] with an async one, so both flavors share the same
//! ordering and termination rules:
//!
//! - the next page is fetched only once the current page is drained and the consumer asks
//!   for another item;
//! - a page without `next` ends the sequence;
//! - a failed fetch is yielded once, at the position it happened, and ends the sequence.

// crates.io
use futures::{Stream, stream};
// self
use crate::{_prelude::*, http::ApiRequest};

/// Query parameter carrying the per-page size hint.
pub const PAGELEN_PARAM: &str = "pagelen";

/// One page of a paginated collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
	/// Items on this page, in server order.
	#[serde(default = "Vec::new")]
	pub values: Vec<T>,
	/// Absolute URL of the next page; absent or `null` on the last page.
	#[serde(default)]
	pub next: Option<String>,
	/// 1-based page number, when reported.
	#[serde(default)]
	pub page: Option<u32>,
	/// Page size used by the server, when reported.
	#[serde(default)]
	pub pagelen: Option<u32>,
	/// Total number of items across all pages, when reported.
	#[serde(default)]
	pub size: Option<u64>,
	/// Absolute URL of the previous page, when reported.
	#[serde(default)]
	pub previous: Option<String>,
}

/// Builds the request for the first page, attaching the optional size hint.
///
/// The hint is only sent with the first request; later pages follow `next` verbatim.
pub fn first_page(path: impl Into<String>, pagelen: Option<u32>) -> ApiRequest {
	let request = ApiRequest::get(path);

	match pagelen {
		Some(pagelen) => request.param(PAGELEN_PARAM, pagelen),
		None => request,
	}
}

/// Returns `true` while an eager listing bounded by `max` should fetch another page.
///
/// `max == 0` means unbounded. Pages are never truncated, so the result may exceed `max`
/// by up to one page.
pub fn wants_more(collected: usize, max: usize) -> bool {
	max == 0 || collected < max
}

/// What a consumer must do next.
#[derive(Debug, PartialEq)]
pub enum CursorStep<T> {
	/// Next buffered item.
	Item(T),
	/// Buffer drained: fetch this request and feed the page to [`PageCursor::absorb`].
	Fetch(ApiRequest),
	/// No further items.
	Done,
}

/// Pull-based pagination state: buffered items plus the pending next-page request.
#[derive(Debug)]
pub struct PageCursor<T> {
	buffer: VecDeque<T>,
	next: Option<ApiRequest>,
	pages: usize,
}
impl<T> PageCursor<T> {
	/// Creates a cursor whose first step fetches `first`.
	pub fn new(first: ApiRequest) -> Self {
		Self { buffer: VecDeque::new(), next: Some(first), pages: 0 }
	}

	/// Advances the cursor.
	///
	/// Returning [`CursorStep::Fetch`] hands the pending request to the caller; if that fetch
	/// fails and is never absorbed, the cursor stays exhausted.
	pub fn step(&mut self) -> CursorStep<T> {
		if let Some(item) = self.buffer.pop_front() {
			return CursorStep::Item(item);
		}

		match self.next.take() {
			Some(request) => CursorStep::Fetch(request),
			None => CursorStep::Done,
		}
	}

	/// Buffers a fetched page and records its `next` link.
	pub fn absorb(&mut self, page: Page<T>) {
		self.pages += 1;
		self.buffer.extend(page.values);
		self.next = page.next.filter(|next| !next.is_empty()).map(ApiRequest::get);
	}

	/// Number of pages absorbed so far.
	pub fn pages_fetched(&self) -> usize {
		self.pages
	}

	/// Items buffered from the current page.
	pub fn buffered(&self) -> usize {
		self.buffer.len()
	}
}

/// Blocking lazy sequence over a paginated collection.
///
/// Created by [`crate::BlockingClient::pages`]. Constructing it performs no I/O.
pub struct PageIter<T, F> {
	cursor: PageCursor<T>,
	fetch: F,
}
impl<T, F> PageIter<T, F>
where
	F: FnMut(ApiRequest) -> Result<Page<T>>,
{
	/// Wraps a cursor starting at `first` with a blocking page fetcher.
	pub fn new(first: ApiRequest, fetch: F) -> Self {
		Self { cursor: PageCursor::new(first), fetch }
	}

	/// Number of pages fetched so far.
	pub fn pages_fetched(&self) -> usize {
		self.cursor.pages_fetched()
	}
}
impl<T, F> Iterator for PageIter<T, F>
where
	F: FnMut(ApiRequest) -> Result<Page<T>>,
{
	type Item = Result<T>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			match self.cursor.step() {
				CursorStep::Item(item) => return Some(Ok(item)),
				CursorStep::Done => return None,
				CursorStep::Fetch(request) => match (self.fetch)(request) {
					Ok(page) => self.cursor.absorb(page),
					Err(e) => return Some(Err(e)),
				},
			}
		}
	}
}
impl<T, F> Debug for PageIter<T, F>
where
	T: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PageIter").field("cursor", &self.cursor).finish_non_exhaustive()
	}
}

/// Async lazy sequence over a paginated collection.
///
/// The stream suspends only inside `fetch`. Dropping it (or aborting it through
/// [`futures::stream::Abortable`]) cancels the in-flight fetch and prevents any further one.
pub fn page_stream<T, F, Fut>(first: ApiRequest, fetch: F) -> impl Stream<Item = Result<T>>
where
	F: FnMut(ApiRequest) -> Fut,
	Fut: Future<Output = Result<Page<T>>>,
{
	stream::unfold((PageCursor::new(first), fetch), |(mut cursor, mut fetch)| async move {
		loop {
			match cursor.step() {
				CursorStep::Item(item) => return Some((Ok(item), (cursor, fetch))),
				CursorStep::Done => return None,
				CursorStep::Fetch(request) => match fetch(request).await {
					Ok(page) => cursor.absorb(page),
					Err(e) => return Some((Err(e), (cursor, fetch))),
				},
			}
		}
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use futures::StreamExt;
	// self
	use super::*;
	use crate::error::ApiError;

	fn page(values: &[u32], next: Option<&str>) -> Page<u32> {
		Page {
			values: values.to_vec(),
			next: next.map(ToOwned::to_owned),
			page: None,
			pagelen: None,
			size: None,
			previous: None,
		}
	}

	fn three_pages(request: &ApiRequest) -> Result<Page<u32>> {
		match request.path.as_str() {
			"items" => Ok(page(&[1, 2], Some("https://x/items?page=2"))),
			"https://x/items?page=2" => Ok(page(&[3, 4], Some("https://x/items?page=3"))),
			"https://x/items?page=3" => Ok(page(&[5, 6], None)),
			other => Err(ApiError::new(404, other).into()),
		}
	}

	#[test]
	fn pages_deserialize_with_optional_fields() {
		let first: Page<u32> = serde_json::from_str(
			r#"{"values":[1,2],"next":"https://x/items?page=2","page":1,"pagelen":2,"size":4}"#,
		)
		.expect("First page should decode.");
		let last: Page<u32> = serde_json::from_str(r#"{"values":[3,4],"next":null}"#)
			.expect("Last page should decode.");
		let empty: Page<u32> = serde_json::from_str("{}").expect("Empty page should decode.");

		assert_eq!(first.next.as_deref(), Some("https://x/items?page=2"));
		assert_eq!(first.size, Some(4));
		assert_eq!(last.next, None);
		assert!(empty.values.is_empty());
	}

	#[test]
	fn first_page_carries_size_hint() {
		let request = first_page("repositories/acme", Some(50));

		assert_eq!(request.params.pairs(), [("pagelen", "50")]);
		assert!(first_page("repositories/acme", None).params.is_empty());
	}

	#[test]
	fn iterator_fetches_lazily_in_order() {
		let mut calls = Vec::new();
		let mut iter = PageIter::new(ApiRequest::get("items"), |request: ApiRequest| {
			calls.push(request.path.clone());

			three_pages(&request)
		});

		assert_eq!(iter.next().map(|item| item.expect("Item should be Ok.")), Some(1));
		assert_eq!(iter.pages_fetched(), 1);

		let rest = iter.by_ref().collect::<Result<Vec<_>>>().expect("All pages should load.");

		assert_eq!(rest, [2, 3, 4, 5, 6]);
		assert_eq!(iter.pages_fetched(), 3);
		assert!(iter.next().is_none());
		drop(iter);
		assert_eq!(calls.len(), 3);
	}

	#[test]
	fn fetch_errors_surface_at_the_failing_page_then_end() {
		let mut iter = PageIter::new(ApiRequest::get("items"), |request: ApiRequest| {
			if request.path == "items" {
				Ok(page(&[1], Some("https://x/broken")))
			} else {
				Err(ApiError::new(500, "boom").into())
			}
		});

		assert_eq!(iter.next().map(|item| item.expect("Item should be Ok.")), Some(1));
		assert!(matches!(iter.next(), Some(Err(Error::Api(ApiError { status: 500, .. })))));
		assert!(iter.next().is_none());
	}

	#[test]
	fn empty_pages_with_next_keep_going() {
		let mut cursor = PageCursor::<u32>::new(ApiRequest::get("items"));

		assert!(matches!(cursor.step(), CursorStep::Fetch(_)));

		cursor.absorb(page(&[], Some("https://x/items?page=2")));

		assert!(matches!(
			cursor.step(),
			CursorStep::Fetch(ref next) if next.path == "https://x/items?page=2"
		));

		cursor.absorb(page(&[7], Some("")));

		assert_eq!(cursor.step(), CursorStep::Item(7));
		assert_eq!(cursor.step(), CursorStep::Done);
	}

	#[test]
	fn eager_bound_stops_only_at_page_boundaries() {
		assert!(wants_more(0, 0));
		assert!(wants_more(1_000, 0));
		assert!(wants_more(2, 3));
		assert!(!wants_more(3, 3));
		assert!(!wants_more(4, 3));
	}

	#[tokio::test]
	async fn stream_yields_items_across_pages() {
		let items = page_stream(ApiRequest::get("items"), |request: ApiRequest| async move {
			three_pages(&request)
		})
		.collect::<Vec<_>>()
		.await
		.into_iter()
		.collect::<Result<Vec<u32>>>()
		.expect("All pages should load.");

		assert_eq!(items, [1, 2, 3, 4, 5, 6]);
	}
}
