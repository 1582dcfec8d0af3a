//! Link-walking pagination with duplicate detection and partial results.
//!
//! The upstream pages listings by `p`/`pagesize` query parameters and signals
//! continuation with a `paging.next` link rather than a reliable total count.
//! [`Paginator`] walks pages lazily in strictly increasing order: fetch the next page
//! with [`next_page`](Paginator::next_page), or aggregate to completion with
//! [`collect_all`](Paginator::collect_all). Items that re-appear under an id already
//! emitted are skipped and recorded as anomalies instead of failing the listing, and
//! a dispatch failure surfaces together with everything produced so far.

// std
use std::collections::HashSet;
// self
use crate::{
	_prelude::*,
	auth::TokenKind,
	dispatch::{RequestDispatcher, RequestSpec},
	http::ApiTransport,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Declaration of a paginated listing endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingSpec {
	/// Collection path relative to the service base URL.
	pub path: String,
	/// Envelope key the items array lives under (differs per collection).
	pub items_key: String,
	/// Page size requested from the upstream.
	pub page_size: u32,
	/// Extra query parameters appended to every page fetch.
	pub query: Vec<(String, String)>,
	/// Token kind the listing endpoint requires.
	pub token_kind: TokenKind,
	/// Per-page-fetch deadline override.
	pub deadline: Option<Duration>,
}
impl ListingSpec {
	/// Default page size matching the upstream's recommendation.
	pub const DEFAULT_PAGE_SIZE: u32 = 50;

	/// Declares a listing for the provided path and items key.
	pub fn new(path: impl Into<String>, items_key: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			items_key: items_key.into(),
			page_size: Self::DEFAULT_PAGE_SIZE,
			query: Vec::new(),
			token_kind: TokenKind::Primary,
			deadline: None,
		}
	}

	/// Overrides the page size.
	pub fn with_page_size(mut self, page_size: u32) -> Self {
		self.page_size = page_size.max(1);

		self
	}

	/// Appends an extra query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Overrides the token kind.
	pub fn with_token_kind(mut self, kind: TokenKind) -> Self {
		self.token_kind = kind;

		self
	}

	/// Overrides the per-page-fetch deadline.
	pub fn with_deadline(mut self, deadline: Duration) -> Self {
		self.deadline = Some(deadline);

		self
	}
}

/// Pagination links reported by the upstream.
///
/// Field presence is inconsistent across endpoint families and versions, so every
/// field is optional and the walker never depends on any of them alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLinks {
	/// Link to the previous page.
	pub previous: Option<String>,
	/// Link to the current page.
	pub actual: Option<String>,
	/// Link to the next page; authoritative continuation signal when present.
	pub next: Option<String>,
	/// Total item count; advisory only, used as a fast-path short-circuit.
	pub item_count: Option<u64>,
}

/// Cursor tracking a pagination walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
	/// 1-based page number of the next fetch; strictly increases per run.
	pub page: u32,
	/// Page size requested from the upstream.
	pub page_size: u32,
	/// Whether the most recent page carried an explicit next link.
	pub next_link_present: bool,
}

/// Duplicate-id anomaly recorded while walking pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationAnomaly {
	/// Item id that was already emitted by an earlier page.
	pub item_id: String,
	/// Page on which the duplicate re-appeared.
	pub page: u32,
}

/// Aggregated result of a completed (or aborted) listing walk.
#[derive(Clone, Debug, Default)]
pub struct Listing {
	/// Items in upstream order, deduplicated by id.
	pub items: Vec<serde_json::Value>,
	/// Duplicate-id anomalies observed during the walk.
	pub anomalies: Vec<PaginationAnomaly>,
	/// Pages fetched during the walk.
	pub pages_fetched: u32,
}

/// Error surfaced when a page fetch fails, carrying the partial sequence.
#[derive(Debug, ThisError)]
#[error("Listing aborted on page {page} after {} items.", .partial.items.len())]
pub struct ListingError {
	/// Items and anomalies produced before the failure.
	pub partial: Listing,
	/// Page whose fetch failed.
	pub page: u32,
	/// Underlying dispatch error.
	#[source]
	pub source: Error,
}

/// Lazy, ordered, finite, restartable walker over a paginated listing.
pub struct Paginator<T>
where
	T: ?Sized + ApiTransport,
{
	dispatcher: Arc<RequestDispatcher<T>>,
	spec: ListingSpec,
	cursor: PageCursor,
	seen: HashSet<String>,
	anomalies: Vec<PaginationAnomaly>,
	emitted: u64,
	done: bool,
}
impl<T> Paginator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a walker positioned before page 1.
	pub fn new(dispatcher: Arc<RequestDispatcher<T>>, spec: ListingSpec) -> Self {
		let cursor = PageCursor { page: 1, page_size: spec.page_size, next_link_present: false };

		Self {
			dispatcher,
			spec,
			cursor,
			seen: HashSet::new(),
			anomalies: Vec::new(),
			emitted: 0,
			done: false,
		}
	}

	/// Returns the current cursor.
	pub fn cursor(&self) -> PageCursor {
		self.cursor
	}

	/// Anomalies recorded so far.
	pub fn anomalies(&self) -> &[PaginationAnomaly] {
		&self.anomalies
	}

	/// Resets the walker to page 1, forgetting emitted ids and anomalies.
	pub fn restart(&mut self) {
		self.cursor = PageCursor {
			page: 1,
			page_size: self.spec.page_size,
			next_link_present: false,
		};
		self.seen.clear();
		self.anomalies.clear();
		self.emitted = 0;
		self.done = false;
	}

	/// Fetches the next page and returns its deduplicated items in upstream order.
	///
	/// Returns `None` once the walk has terminated. Dropping the walker between calls
	/// cancels the listing; items already returned stay with the caller.
	pub async fn next_page(&mut self) -> Result<Option<Vec<serde_json::Value>>> {
		if self.done {
			return Ok(None);
		}

		let quirks = &self.dispatcher.tokens.descriptor.quirks;
		let mut request = RequestSpec::get(&self.spec.path)
			.with_query(&quirks.page_param, self.cursor.page.to_string())
			.with_query(&quirks.page_size_param, self.spec.page_size.to_string())
			.with_token_kind(self.spec.token_kind);

		for (key, value) in &self.spec.query {
			request = request.with_query(key, value);
		}
		if let Some(deadline) = self.spec.deadline {
			request = request.with_deadline(deadline);
		}

		let response = self.dispatcher.send(&request).await?;
		let body = response.json_value()?;
		let raw_items = match body.get(&self.spec.items_key) {
			Some(serde_json::Value::Array(items)) => items.clone(),
			Some(serde_json::Value::Null) => Vec::new(),
			_ =>
				return Err(crate::error::ConfigError::MissingItemsKey {
					key: self.spec.items_key.clone(),
				}
				.into()),
		};
		let links: PageLinks = body
			.get("paging")
			.cloned()
			.and_then(|value| serde_json::from_value(value).ok())
			.unwrap_or_default();
		let raw_count = raw_items.len();
		let page = self.cursor.page;
		let mut items = Vec::with_capacity(raw_count);

		for item in raw_items {
			match item_id(&item) {
				Some(id) if !self.seen.insert(id.clone()) => {
					// Upstream glitch: the same id re-appeared on a later page. Skip it
					// rather than failing the whole listing.
					self.anomalies.push(PaginationAnomaly { item_id: id, page });
					#[cfg(feature = "tracing")]
					tracing::warn!(page, "skipping duplicate listing item");
				},
				_ => items.push(item),
			}
		}

		self.emitted += items.len() as u64;
		self.cursor.next_link_present = links.next.is_some();
		self.cursor.page += 1;
		self.done = !should_continue(&links, raw_count, self.spec.page_size, self.emitted);

		Ok(Some(items))
	}

	/// Walks every remaining page and aggregates the ordered, deduplicated sequence.
	pub async fn collect_all(mut self) -> Result<Listing, ListingError> {
		const KIND: OpKind = OpKind::List;

		let span = OpSpan::new(KIND, "collect_all");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let mut listing = Listing::default();

				loop {
					let page = self.cursor.page;

					match self.next_page().await {
						Ok(Some(items)) => {
							listing.items.extend(items);
							listing.pages_fetched += 1;
						},
						Ok(None) => {
							listing.anomalies = self.anomalies;

							return Ok(listing);
						},
						Err(source) => {
							listing.anomalies = self.anomalies;

							return Err(ListingError { partial: listing, page, source });
						},
					}
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}
}
impl<T> Debug for Paginator<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Paginator")
			.field("spec", &self.spec)
			.field("cursor", &self.cursor)
			.field("emitted", &self.emitted)
			.field("done", &self.done)
			.finish()
	}
}

// Continuation rule: an explicit next link always continues; absent one, a full page
// implies more data may exist. A short page terminates. The advisory item_count only
// ever stops the walk early, never extends it.
fn should_continue(links: &PageLinks, raw_count: usize, page_size: u32, emitted: u64) -> bool {
	if raw_count == 0 {
		return false;
	}
	if let Some(total) = links.item_count
		&& emitted >= total
		&& links.next.is_none()
	{
		return false;
	}

	links.next.is_some() || raw_count as u32 >= page_size
}

fn item_id(item: &serde_json::Value) -> Option<String> {
	match item.get("id") {
		Some(serde_json::Value::String(id)) => Some(id.clone()),
		Some(serde_json::Value::Number(id)) => Some(id.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn links(next: Option<&str>, item_count: Option<u64>) -> PageLinks {
		PageLinks { next: next.map(str::to_owned), item_count, ..PageLinks::default() }
	}

	#[test]
	fn full_page_without_metadata_continues() {
		assert!(should_continue(&PageLinks::default(), 50, 50, 50));
	}

	#[test]
	fn short_page_terminates() {
		assert!(!should_continue(&PageLinks::default(), 39, 50, 189));
		assert!(!should_continue(&links(None, None), 0, 50, 0));
	}

	#[test]
	fn next_link_wins_over_short_page() {
		assert!(should_continue(&links(Some("/videos.json?p=3"), None), 12, 50, 62));
	}

	#[test]
	fn item_count_short_circuits_only_without_next() {
		assert!(!should_continue(&links(None, Some(100)), 50, 50, 100));
		assert!(should_continue(&links(Some("/p=3"), Some(100)), 50, 50, 100));
		assert!(should_continue(&links(None, Some(120)), 50, 50, 100));
	}

	#[test]
	fn item_ids_normalize_strings_and_numbers() {
		assert_eq!(item_id(&serde_json::json!({"id": "abc"})), Some("abc".into()));
		assert_eq!(item_id(&serde_json::json!({"id": 42})), Some("42".into()));
		assert_eq!(item_id(&serde_json::json!({"title": "no id"})), None);
	}
}
