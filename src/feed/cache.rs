use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use super::{FeedError, FeedSource};
use crate::columns::{ColumnLayout, ColumnMap};
use crate::parse::RawTable;

/// Snapshot lifetime: the whole feed is one cached unit, refetched at
/// most once a minute.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// The positional layout reads up to the sheet's column M, so any
/// usable export carries at least this many columns.
pub const MIN_COLUMNS: usize = 13;

/// Markers of an HTML login/permission page, sniffed from the
/// lowercased head of the body. The publisher answers with one of
/// these instead of CSV when the sheet is not shared publicly.
const LOGIN_PAGE_MARKERS: &[&str] = &["<html", "accounts.google", "signin"];
const SNIFF_WINDOW_CHARS: usize = 300;
const SNIPPET_CHARS: usize = 120;

/// One fetch cycle's immutable parse result. Concurrent queries inside
/// the same cycle share a single `Arc<Snapshot>`.
pub struct Snapshot {
    pub fetched_at: Instant,
    pub fetched_at_utc: DateTime<Utc>,
    pub table: RawTable,
    pub layout: ColumnLayout,
}

impl Snapshot {
    /// Validate a raw feed body and build the cycle's snapshot. The
    /// checks run in order and each failure is distinguishable: login
    /// page, empty parse, schema width.
    pub fn build(body: &str) -> Result<Self, FeedError> {
        let head: String = body
            .chars()
            .take(SNIFF_WINDOW_CHARS)
            .collect::<String>()
            .to_lowercase();
        if LOGIN_PAGE_MARKERS.iter().any(|marker| head.contains(marker)) {
            return Err(FeedError::LoginPage {
                snippet: head.chars().take(SNIPPET_CHARS).collect(),
            });
        }

        let table = RawTable::parse(body);
        if table.is_empty() {
            return Err(FeedError::Empty);
        }

        let width = table.max_width();
        if width < MIN_COLUMNS {
            return Err(FeedError::SchemaTooNarrow {
                width,
                min: MIN_COLUMNS,
            });
        }

        let layout = ColumnLayout::detect(&table.rows[0]);
        Ok(Self {
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            table,
            layout,
        })
    }

    pub fn columns(&self) -> &ColumnMap {
        self.layout.columns()
    }

    /// Rows to match against: all rows, or all rows after a consumed
    /// header row.
    pub fn data_rows(&self) -> &[Vec<String>] {
        if self.layout.consumes_header_row() {
            &self.table.rows[1..]
        } else {
            &self.table.rows
        }
    }
}

/// What `get_or_refresh` hands back alongside the snapshot itself.
pub struct SnapshotView {
    pub snapshot: Arc<Snapshot>,
    pub from_cache: bool,
    pub remaining_ttl: Duration,
}

/// Single-slot feed cache. An explicit service object rather than a
/// process-wide global, so it can be constructed per test with a
/// scripted source.
pub struct FeedCache<S> {
    source: S,
    ttl: Duration,
    slot: Mutex<Option<Arc<Snapshot>>>,
}

impl<S: FeedSource> FeedCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_ttl(source, DEFAULT_TTL)
    }

    pub fn with_ttl(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the live snapshot, refetching when the slot is empty or
    /// expired. The lock is held across the refetch, so concurrent
    /// callers on the multi-threaded runtime observe one in-flight
    /// fetch instead of racing their own. A failed fetch leaves the
    /// slot untouched: negative results are never cached, the next
    /// call retries.
    pub async fn get_or_refresh(&self) -> Result<SnapshotView, FeedError> {
        let mut slot = self.slot.lock().await;

        if let Some(snapshot) = slot.as_ref() {
            let age = snapshot.fetched_at.elapsed();
            if age < self.ttl {
                return Ok(SnapshotView {
                    snapshot: Arc::clone(snapshot),
                    from_cache: true,
                    remaining_ttl: self.ttl - age,
                });
            }
        }

        let body = self.source.fetch().await?;
        let snapshot = Arc::new(Snapshot::build(&body)?);
        info!(
            rows = snapshot.table.rows.len(),
            header_row = snapshot.layout.consumes_header_row(),
            fetched_at = %snapshot.fetched_at_utc,
            "refreshed classroom feed snapshot"
        );
        *slot = Some(Arc::clone(&snapshot));
        Ok(SnapshotView {
            snapshot,
            from_cache: false,
            remaining_ttl: self.ttl,
        })
    }
}
