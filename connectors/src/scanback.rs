//! Trade history backfill ("scanback").
//!
//! Some exchanges only hand out small pages of recent trades, newest first,
//! addressed by a trade id cursor. To get everything since a point in time
//! we first jump backwards until a page reaches past `since`, then walk
//! forward page by page from there until no new trades show up.

use async_trait::async_trait;
use common::{
    models::{Trade, TradeId},
    Result,
};
use std::collections::HashSet;
use tracing::debug;

/// Backwards jumps grow by one batch per attempt up to this many attempts
const MAX_SCAN_ATTEMPT: u64 = 100;
/// ...after which the jump size drops back to this many batches
const RESET_SCAN_ATTEMPT: u64 = 10;

/// Raw cursor paginated access to an exchange's public trades
#[async_trait]
pub trait TradePager: Send + Sync {
    /// Number of trades the exchange returns per page
    fn batch_size(&self) -> usize;

    /// Up to `limit` trades, newest first. With `after` set, only trades
    /// with an id below `after` are returned.
    async fn fetch_page(&self, after: Option<TradeId>, limit: usize) -> Result<Vec<Trade>>;
}

/// How scanned pages are handed to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// One sorted, de-duplicated list once the scan is complete
    #[default]
    Accumulate,
    /// Every page as soon as it is scanned, oldest first
    Import,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScanbackState {
    #[default]
    Idle,
    ScanningBack {
        since: i64,
        /// Cursor for the next backwards fetch, `None` for the newest page
        after: Option<TradeId>,
        attempt: u64,
        /// Newest trade id seen when the scan started
        head: Option<TradeId>,
    },
    ScanningForward {
        cursor: TradeId,
        head: TradeId,
        /// Newest trade id already handed out or accumulated
        delivered: Option<TradeId>,
        accumulated: Vec<Trade>,
    },
}

#[derive(Debug, Default)]
pub struct Scanback {
    state: ScanbackState,
    delivery: Delivery,
}

impl Scanback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ScanbackState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, ScanbackState::Idle)
    }

    pub fn reset(&mut self) {
        self.state = ScanbackState::Idle;
    }

    fn begin(&mut self, since: i64, delivery: Delivery) {
        debug!("Scanning back in the history needed... (since {})", since);
        self.delivery = delivery;
        self.state = ScanbackState::ScanningBack {
            since,
            after: None,
            attempt: 0,
            head: None,
        };
    }

    /// Scan everything since `since` and return it oldest first.
    ///
    /// Any failure drops the scan, a new call starts over from scratch.
    pub async fn collect<P>(&mut self, pager: &P, since: i64) -> Result<Vec<Trade>>
    where
        P: TradePager + ?Sized,
    {
        self.begin(since, Delivery::Accumulate);
        loop {
            match self.step(pager).await {
                Ok(trades) if !self.is_active() => return Ok(trades),
                Ok(_) => {}
                Err(err) => {
                    self.reset();
                    return Err(err);
                }
            }
        }
    }

    /// Return the next page of an import since `since`, oldest first. An
    /// empty page means the import caught up with the exchange.
    ///
    /// Once the scan moves forward a failure keeps the cursor, so pages that
    /// were already returned are not returned again by the next call.
    pub async fn next_page<P>(&mut self, pager: &P, since: i64) -> Result<Vec<Trade>>
    where
        P: TradePager + ?Sized,
    {
        if !self.is_active() || self.delivery != Delivery::Import {
            self.begin(since, Delivery::Import);
        }

        loop {
            match self.step(pager).await {
                Ok(page) if !page.is_empty() || !self.is_active() => return Ok(page),
                Ok(_) => {}
                Err(err) => {
                    if matches!(self.state, ScanbackState::ScanningBack { .. }) {
                        self.reset();
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Fetch one page and advance the state machine. Returns whatever is
    /// ready for the caller after this page.
    async fn step<P>(&mut self, pager: &P) -> Result<Vec<Trade>>
    where
        P: TradePager + ?Sized,
    {
        let limit = pager.batch_size();
        let batch = limit as TradeId;

        let after = match &self.state {
            ScanbackState::Idle => return Ok(Vec::new()),
            ScanbackState::ScanningBack { after, .. } => *after,
            ScanbackState::ScanningForward { cursor, .. } => Some(cursor + batch + 1),
        };

        // the state is only touched once the fetch succeeded
        let page = pager.fetch_page(after, limit).await?;

        match std::mem::take(&mut self.state) {
            ScanbackState::Idle => Ok(Vec::new()),
            ScanbackState::ScanningBack {
                since,
                attempt,
                head,
                ..
            } => Ok(self.scanned_back(page, since, after, attempt, head, batch)),
            ScanbackState::ScanningForward {
                cursor,
                head,
                delivered,
                accumulated,
            } => Ok(self.scanned_forward(page, false, cursor, head, delivered, accumulated, batch)),
        }
    }

    fn scanned_back(
        &mut self,
        page: Vec<Trade>,
        since: i64,
        after: Option<TradeId>,
        attempt: u64,
        head: Option<TradeId>,
        batch: TradeId,
    ) -> Vec<Trade> {
        let head = head.or_else(|| page.first().map(|t| t.tid));

        let oldest = match page.last() {
            Some(oldest) => oldest.clone(),
            None => {
                return match head {
                    // the exchange has no trades at all
                    None => self.finish(Vec::new()),
                    // jumped back past the very first trade, walk forward from here
                    Some(head) => {
                        let cursor = after.unwrap_or(0).saturating_sub(1);
                        debug!("Scanned back past the first trade, moving forward from {}", cursor);
                        self.state = ScanbackState::ScanningForward {
                            cursor,
                            head,
                            delivered: None,
                            accumulated: Vec::new(),
                        };
                        Vec::new()
                    }
                };
            }
        };
        let head = head.unwrap_or(oldest.tid);

        if oldest.date < since {
            debug!(
                "Found the start of the history at {} ({})",
                oldest.date, oldest.tid
            );
            return self.scanned_forward(page, true, oldest.tid, head, None, Vec::new(), batch);
        }

        debug!("Scanning backwards... {} ({})", oldest.date, oldest.tid);
        let next = oldest.tid.saturating_sub(batch * attempt);
        let mut attempt = attempt + 1;
        if attempt > MAX_SCAN_ATTEMPT {
            attempt = RESET_SCAN_ATTEMPT;
        }

        self.state = ScanbackState::ScanningBack {
            since,
            after: Some(next),
            attempt,
            head: Some(head),
        };
        Vec::new()
    }

    #[allow(clippy::too_many_arguments)]
    fn scanned_forward(
        &mut self,
        page: Vec<Trade>,
        first: bool,
        mut cursor: TradeId,
        head: TradeId,
        mut delivered: Option<TradeId>,
        mut accumulated: Vec<Trade>,
        batch: TradeId,
    ) -> Vec<Trade> {
        let newest = page.first().map(|t| t.tid);
        if let (Some(first_trade), Some(last_trade)) = (page.first(), page.last()) {
            debug!(
                "Forward: {} ({}) to {} ({})",
                last_trade.date, last_trade.tid, first_trade.date, first_trade.tid
            );
        }

        let fresh: Vec<Trade> = page
            .into_iter()
            .rev()
            .filter(|t| delivered.map_or(true, |d| t.tid > d))
            .collect();
        if let Some(last) = fresh.last() {
            delivered = Some(last.tid);
        }

        let complete = match newest {
            Some(newest) if newest > cursor || first => {
                cursor = cursor.max(newest);
                false
            }
            // no progress, either we caught up or there's a hole in the ids
            _ if cursor >= head => true,
            _ => {
                cursor += batch;
                false
            }
        };

        let out = match self.delivery {
            Delivery::Import => fresh,
            Delivery::Accumulate => {
                accumulated.extend(fresh);
                Vec::new()
            }
        };

        if complete {
            debug!("Scan finished: data found: {}", accumulated.len());
            return match self.delivery {
                Delivery::Import => {
                    self.reset();
                    out
                }
                Delivery::Accumulate => self.finish(accumulated),
            };
        }

        self.state = ScanbackState::ScanningForward {
            cursor,
            head,
            delivered,
            accumulated,
        };
        out
    }

    fn finish(&mut self, trades: Vec<Trade>) -> Vec<Trade> {
        self.reset();
        normalize(trades)
    }
}

/// Sort trades oldest first and drop repeated trade ids.
pub fn normalize(mut trades: Vec<Trade>) -> Vec<Trade> {
    trades.sort_by(|a, b| a.date.cmp(&b.date).then(a.tid.cmp(&b.tid)));
    let mut seen = HashSet::with_capacity(trades.len());
    trades.retain(|t| seen.insert(t.tid));
    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const START: i64 = 1_500_000_000;

    /// In memory exchange with trades 1..=count, one every 10 seconds
    struct Simulated {
        trades: Vec<Trade>,
        batch: usize,
        requests: Mutex<Vec<Option<TradeId>>>,
    }

    impl Simulated {
        fn new(count: u64, batch: usize) -> Self {
            Self::with_ids((1..=count).collect(), batch)
        }

        fn with_ids(ids: Vec<TradeId>, batch: usize) -> Self {
            let trades = ids
                .into_iter()
                .map(|tid| Trade {
                    tid,
                    date: START + tid as i64 * 10,
                    price: 100.0 + tid as f64,
                    amount: 0.5,
                })
                .collect();
            Self {
                trades,
                batch,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn date_of(&self, tid: TradeId) -> i64 {
            START + tid as i64 * 10
        }
    }

    #[async_trait]
    impl TradePager for Simulated {
        fn batch_size(&self) -> usize {
            self.batch
        }

        async fn fetch_page(&self, after: Option<TradeId>, limit: usize) -> Result<Vec<Trade>> {
            self.requests.lock().unwrap().push(after);
            Ok(self
                .trades
                .iter()
                .rev()
                .filter(|t| after.map_or(true, |a| t.tid < a))
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn assert_ordered_unique(trades: &[Trade]) {
        for pair in trades.windows(2) {
            assert!(pair[0].date < pair[1].date, "{:?} before {:?}", pair[0], pair[1]);
        }
        let unique: HashSet<_> = trades.iter().map(|t| t.tid).collect();
        assert_eq!(unique.len(), trades.len());
    }

    #[tokio::test]
    async fn collects_everything_since() {
        let exchange = Simulated::new(1_000, 100);
        let since = exchange.date_of(250);

        let mut scanback = Scanback::new();
        let trades = scanback.collect(&exchange, since).await.unwrap();

        assert_ordered_unique(&trades);
        let recent: Vec<TradeId> = trades
            .iter()
            .filter(|t| t.date >= since)
            .map(|t| t.tid)
            .collect();
        assert_eq!(recent, (250..=1_000).collect::<Vec<_>>());
        assert_eq!(trades.last().map(|t| t.tid), Some(1_000));
        assert!(!scanback.is_active());
    }

    #[tokio::test]
    async fn first_backwards_step_is_contiguous() {
        let exchange = Simulated::new(1_000, 100);
        let mut scanback = Scanback::new();
        scanback
            .collect(&exchange, exchange.date_of(650))
            .await
            .unwrap();

        let requests = exchange.requests.lock().unwrap().clone();
        assert_eq!(requests[0], None);
        assert_eq!(requests[1], Some(901));
        // then one batch further back per attempt
        assert_eq!(requests[2], Some(801 - 100));
        // found 601..700, walk forward from its newest trade
        assert_eq!(requests[3], Some(700 + 100 + 1));
    }

    #[tokio::test]
    async fn recent_since_stays_on_the_first_page() {
        let exchange = Simulated::new(1_000, 100);
        let since = exchange.date_of(990);

        let trades = Scanback::new().collect(&exchange, since).await.unwrap();

        assert_ordered_unique(&trades);
        assert_eq!(trades.first().map(|t| t.tid), Some(901));
        assert_eq!(trades.last().map(|t| t.tid), Some(1_000));
    }

    #[tokio::test]
    async fn since_before_first_trade_returns_everything() {
        let exchange = Simulated::new(2_500, 100);

        let trades = Scanback::new().collect(&exchange, START - 3_600).await.unwrap();

        assert_ordered_unique(&trades);
        assert_eq!(trades.len(), 2_500);
    }

    #[tokio::test]
    async fn empty_exchange_completes() {
        let exchange = Simulated::new(0, 100);
        let mut scanback = Scanback::new();

        let trades = scanback.collect(&exchange, START).await.unwrap();

        assert!(trades.is_empty());
        assert!(!scanback.is_active());
    }

    #[tokio::test]
    async fn sparse_ids_are_walked_across() {
        let ids: Vec<TradeId> = (1..=300)
            .map(|i| if i > 150 { i * 3 + 500 } else { i })
            .collect();
        let exchange = Simulated::with_ids(ids.clone(), 50);
        let since = exchange.date_of(120);

        let trades = Scanback::new().collect(&exchange, since).await.unwrap();

        assert_ordered_unique(&trades);
        let recent: Vec<TradeId> = trades
            .iter()
            .filter(|t| t.date >= since)
            .map(|t| t.tid)
            .collect();
        let expected: Vec<TradeId> = ids.into_iter().filter(|&tid| tid >= 120).collect();
        assert_eq!(recent, expected);
    }

    #[tokio::test]
    async fn import_pages_add_up_to_the_collected_history() {
        let exchange = Simulated::new(1_000, 100);
        let since = exchange.date_of(333);

        let collected = Scanback::new().collect(&exchange, since).await.unwrap();

        let mut scanback = Scanback::new();
        let mut imported = Vec::new();
        loop {
            let page = scanback.next_page(&exchange, since).await.unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 100);
            assert_ordered_unique(&page);
            imported.extend(page);
        }

        assert_eq!(imported, collected);
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let trade = |tid, date| Trade {
            tid,
            date,
            price: 1.0,
            amount: 1.0,
        };
        let trades = vec![trade(3, 30), trade(1, 10), trade(2, 20), trade(3, 30), trade(1, 10)];

        let normalized = normalize(trades);

        assert_eq!(
            normalized.iter().map(|t| t.tid).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(normalize(normalized.clone()), normalized);
    }

    #[tokio::test]
    async fn collected_history_is_stable_as_a_single_page() {
        let exchange = Simulated::new(640, 100);
        let since = exchange.date_of(100);
        let trades = Scanback::new().collect(&exchange, since).await.unwrap();

        // serve the result back as one big newest first page
        let single = Simulated {
            trades: trades.clone(),
            batch: trades.len() + 1,
            requests: Mutex::new(Vec::new()),
        };
        let again = Scanback::new().collect(&single, since).await.unwrap();

        assert_eq!(again, trades);
    }
}
