use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use perpbot::backtest::{MarketScenario, ReplayFeed, SyntheticDataGenerator};
use perpbot::classifier::{Classifier, ForestClassifier};
use perpbot::engine::{EngineSettings, TradingEngine};
use perpbot::execution::{ExecutionVenue, OrderOutcome, OrderRequest, PaperVenue, Portfolio};
use perpbot::features::FeatureVector;
use perpbot::notify::{Notifications, RecordingNotifier};
use perpbot::risk::RiskParameters;
use perpbot::strategy::SignalGenerator;
use perpbot::{Bar, ExitReason, FetchError, MarketData, Side, TickError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Scripted capabilities
// ============================================================================

/// Signals a buy on its first call only
#[derive(Default)]
struct FirstCallBuys {
    fired: AtomicBool,
}

impl Classifier for FirstCallBuys {
    fn predict(&self, _: &FeatureVector) -> f64 {
        if self.fired.swap(true, Ordering::SeqCst) {
            0.0
        } else {
            0.9
        }
    }
}

struct AlwaysBuys;

impl Classifier for AlwaysBuys {
    fn predict(&self, _: &FeatureVector) -> f64 {
        0.99
    }
}

/// Rejects the first `failures` orders matching `reduce_only`, then defers to paper
struct FlakyVenue {
    inner: PaperVenue,
    reduce_only: bool,
    failures: AtomicUsize,
    orders: Mutex<Vec<OrderRequest>>,
}

impl FlakyVenue {
    fn new(reduce_only: bool, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: PaperVenue::new(),
            reduce_only,
            failures: AtomicUsize::new(failures),
            orders: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ExecutionVenue for FlakyVenue {
    async fn place_market_order(&self, order: &OrderRequest) -> OrderOutcome {
        self.orders.lock().unwrap().push(order.clone());
        if order.reduce_only == self.reduce_only
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return OrderOutcome::Rejected {
                reason: "venue unavailable".into(),
            };
        }
        self.inner.place_market_order(order).await
    }
}

/// Fails the first fetch, then replays
struct FlakyFeed {
    inner: ReplayFeed,
    failed: AtomicBool,
}

#[async_trait]
impl MarketData for FlakyFeed {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, FetchError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(FetchError::Api {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        self.inner.fetch_candles(symbol, timeframe, limit).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 25 bars climbing to 50000, then a monotonic rally to 55000
fn rally_series() -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut closes: Vec<f64> = (0..25).map(|i| 50000.0 - 40.0 * (24 - i) as f64).collect();
    closes.extend([51000.0, 52000.0, 53000.0, 54000.0, 55000.0]);

    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + ChronoDuration::minutes(15 * i as i64),
            open: close - 10.0,
            high: close + 25.0,
            low: close - 25.0,
            close,
            volume: 120.0 + (i % 4) as f64 * 15.0,
        })
        .collect()
}

fn build_engine(
    market: Arc<dyn MarketData>,
    venue: Arc<dyn ExecutionVenue>,
    classifier: Arc<dyn Classifier>,
    start: chrono::DateTime<Utc>,
) -> (TradingEngine, Arc<RecordingNotifier>) {
    let recorder = Arc::new(RecordingNotifier::new());
    let engine = TradingEngine::new(
        market,
        venue,
        Notifications::new(recorder.clone(), Duration::from_secs(1)),
        SignalGenerator::new(classifier, 0.45),
        Portfolio::new(100.0, RiskParameters::default(), start),
        EngineSettings::default(),
    );
    (engine, recorder)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_long_opens_then_closes_at_take_profit() {
    let bars = rally_series();
    let feed = Arc::new(ReplayFeed::new(bars.clone()));
    let venue = Arc::new(PaperVenue::new());
    let (mut engine, recorder) = build_engine(
        feed.clone(),
        venue.clone(),
        Arc::new(FirstCallBuys::default()),
        bars[0].timestamp,
    );

    // First full window: one long at 50000
    feed.seek(24);
    let report = assert_ok!(engine.tick_at(bars[24].timestamp).await);
    let trade = report.opened.expect("long should open on the first window");
    assert_eq!(trade.side(), Side::Long);
    assert_eq!(trade.entry_price(), 50000.0);
    assert!((trade.stop_loss() - 49000.0).abs() < 1e-9);
    assert!((trade.take_profit() - 53000.0).abs() < 1e-9);
    assert!((trade.size() - 0.002).abs() < 1e-15);

    let tp = trade.take_profit();
    let close_index = (25..bars.len())
        .find(|&i| bars[i].close >= tp)
        .expect("rally crosses the take-profit");

    let mut closed = Vec::new();
    for i in 25..bars.len() {
        feed.seek(i);
        let report = assert_ok!(engine.tick_at(bars[i].timestamp).await);
        assert!(report.opened.is_none());
        if !report.closed.is_empty() {
            assert_eq!(i, close_index, "closed before the take-profit was reached");
        }
        closed.extend(report.closed);
    }

    assert_eq!(closed.len(), 1);
    let result = &closed[0];
    assert_eq!(result.reason, ExitReason::TakeProfit);
    assert_eq!(result.trade.id(), trade.id());

    let market_price = bars[close_index].close;
    let size = trade.size();
    let expected = 100.0 + (tp - 50000.0) * size - (50000.0 * size + market_price * size) * 0.0005;
    let portfolio = engine.portfolio();
    assert!((portfolio.balance() - expected).abs() < 1e-9);
    if market_price == 53000.0 {
        assert!((portfolio.balance() - 105.897).abs() < 1e-9);
    }
    assert_eq!(portfolio.wins(), 1);
    assert_eq!(portfolio.losses(), 0);
    assert_eq!(portfolio.total_trades(), 1);
    assert_eq!(portfolio.ledger().count(), 0);
    assert_eq!(venue.net_position(), 0.0);

    let messages = recorder.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("NEW TRADE OPENED"));
    assert!(messages[1].contains("TP HIT"));
}

#[tokio::test]
async fn test_rejected_open_leaves_no_phantom_trade() {
    let bars = rally_series();
    let feed = Arc::new(ReplayFeed::new(bars.clone()));
    let venue = FlakyVenue::new(false, 1);
    let (mut engine, recorder) = build_engine(
        feed.clone(),
        venue.clone(),
        Arc::new(AlwaysBuys),
        bars[0].timestamp,
    );

    feed.seek(24);
    let err = assert_err!(engine.tick_at(bars[24].timestamp).await);
    assert!(matches!(err, TickError::OpenOrder(_)));
    assert_eq!(engine.portfolio().ledger().count(), 0);
    assert_eq!(engine.portfolio().total_trades(), 0);
    assert_eq!(engine.portfolio().balance(), 100.0);
    assert!(recorder.messages().is_empty());

    assert!(!err.is_critical());
    engine.handle_tick_error(&err).await;
    assert!(recorder.messages().is_empty());

    // The venue recovers and the next tick trades normally
    feed.seek(25);
    let report = assert_ok!(engine.tick_at(bars[25].timestamp).await);
    assert!(report.opened.is_some());
    assert_eq!(engine.portfolio().total_trades(), 1);
}

#[tokio::test]
async fn test_failed_close_is_retried_next_tick() {
    let bars = rally_series();
    let feed = Arc::new(ReplayFeed::new(bars.clone()));
    let venue = FlakyVenue::new(true, 1);
    let (mut engine, _) = build_engine(
        feed.clone(),
        venue.clone(),
        Arc::new(FirstCallBuys::default()),
        bars[0].timestamp,
    );

    feed.seek(24);
    assert_ok!(engine.tick_at(bars[24].timestamp).await);

    // Straight to the 54000 bar: above take-profit, but the close is rejected
    feed.seek(28);
    let report = assert_ok!(engine.tick_at(bars[28].timestamp).await);
    assert!(report.closed.is_empty());
    assert_eq!(engine.portfolio().ledger().count(), 1);
    assert_eq!(engine.portfolio().balance(), 100.0);

    feed.seek(29);
    let report = assert_ok!(engine.tick_at(bars[29].timestamp).await);
    assert_eq!(report.closed.len(), 1);
    assert_eq!(engine.portfolio().wins(), 1);

    let reduce_only = venue
        .orders
        .lock()
        .unwrap()
        .iter()
        .filter(|o| o.reduce_only)
        .count();
    assert_eq!(reduce_only, 2);
}

#[tokio::test]
async fn test_fetch_failure_is_skipped() {
    let bars = rally_series();
    let feed = Arc::new(FlakyFeed {
        inner: ReplayFeed::new(bars.clone()),
        failed: AtomicBool::new(false),
    });
    feed.inner.seek(24);
    let (mut engine, recorder) = build_engine(
        feed.clone(),
        Arc::new(PaperVenue::new()),
        Arc::new(AlwaysBuys),
        bars[0].timestamp,
    );

    let err = assert_err!(engine.tick_at(bars[24].timestamp).await);
    assert!(matches!(err, TickError::Fetch(_)));
    assert!(!err.is_critical());
    engine.handle_tick_error(&err).await;
    assert!(recorder.messages().is_empty());
    assert_eq!(engine.portfolio().total_trades(), 0);

    let report = assert_ok!(engine.tick_at(bars[24].timestamp).await);
    assert!(report.opened.is_some());
}

#[tokio::test]
async fn test_ledger_never_exceeds_capacity() {
    let bars = SyntheticDataGenerator::new(11).generate(MarketScenario::Volatile, 300, 15);
    let feed = Arc::new(ReplayFeed::new(bars.clone()));
    let (mut engine, _) = build_engine(
        feed.clone(),
        Arc::new(PaperVenue::new()),
        Arc::new(AlwaysBuys),
        bars[0].timestamp,
    );

    let mut closed = 0;
    for i in 24..bars.len() {
        feed.seek(i);
        let report = assert_ok!(engine.tick_at(bars[i].timestamp).await);
        closed += report.closed.len();
        assert!(engine.portfolio().ledger().count() <= 2);
    }

    let portfolio = engine.portfolio();
    assert!(closed > 0);
    assert_eq!(
        portfolio.total_trades(),
        portfolio.wins() + portfolio.losses() + portfolio.ledger().count() as u64
    );
}

#[tokio::test]
async fn test_forest_artifact_drives_engine() {
    // One stump on return_1: rising bars score 0.8, falling bars 0.1
    let artifact = r#"{
        "feature_names": ["return_1","return_5","return_10","volume_change_1","volume_change_5","candle_range","volatility_10"],
        "trees": [
            {"nodes": [
                {"feature": 0, "threshold": 0.0, "left": 1, "right": 2},
                {"probability": 0.1},
                {"probability": 0.8}
            ]}
        ]
    }"#;
    let forest = Arc::new(ForestClassifier::from_json(artifact).unwrap());

    // Falling series: the long side misses, the mirrored short side hits
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let bars: Vec<Bar> = (0..25)
        .map(|i| {
            let close = 60000.0 - 50.0 * i as f64;
            Bar {
                timestamp: start + ChronoDuration::minutes(15 * i as i64),
                open: close + 10.0,
                high: close + 30.0,
                low: close - 30.0,
                close,
                volume: 200.0 + i as f64,
            }
        })
        .collect();
    let feed = Arc::new(ReplayFeed::new(bars.clone()));
    feed.seek(24);

    let (mut engine, _) = build_engine(feed, Arc::new(PaperVenue::new()), forest, start);
    let report = assert_ok!(engine.tick_at(bars[24].timestamp).await);

    let evaluation = report.evaluation.unwrap();
    assert_eq!(evaluation.buy_probability, 0.1);
    assert_eq!(evaluation.sell_probability, Some(0.8));
    let trade = report.opened.unwrap();
    assert_eq!(trade.side(), Side::Short);
    assert!(trade.stop_loss() > trade.entry_price());
    assert!(trade.take_profit() < trade.entry_price());
}
