use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::Bar;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±3% swings per bar)
    Volatile,
    /// Normal first half, then a 25% slide
    Crash,
}

/// Generates synthetic perp bars for backtesting
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start_time: DateTime<Utc>,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 50_000.0,
            base_volume: 1_500.0,
            start_time: Utc
                .timestamp_opt(1_704_067_200, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Generate `num_bars` bars, `interval_minutes` apart, for a scenario
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_bars: usize,
        interval_minutes: i64,
    ) -> Vec<Bar> {
        let bars_per_day = 24.0 * 60.0 / interval_minutes as f64;
        let mut price = self.base_price;
        let mut bars = Vec::with_capacity(num_bars);

        for i in 0..num_bars {
            let timestamp = self.start_time + Duration::minutes(i as i64 * interval_minutes);

            let change = match scenario {
                MarketScenario::Uptrend => {
                    price * (0.02 / bars_per_day + self.rng.gen_range(-0.001..0.001))
                }
                MarketScenario::Downtrend => {
                    price * (-0.02 / bars_per_day + self.rng.gen_range(-0.001..0.001))
                }
                MarketScenario::Sideways => {
                    // 10% pull to the mean plus ±1% noise
                    (self.base_price - price) * 0.1 + price * self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => price * self.rng.gen_range(-0.03..0.03),
                MarketScenario::Crash => {
                    if i < num_bars / 2 {
                        price * self.rng.gen_range(-0.005..0.01)
                    } else {
                        let drop_rate = -0.25 / (num_bars as f64 / 2.0);
                        price * (drop_rate + self.rng.gen_range(-0.005..0.005))
                    }
                }
            };
            price = (price + change).max(self.base_price * 0.2);

            bars.push(self.create_bar(price, timestamp));
        }

        bars
    }

    /// Realistic OHLCV around a close
    fn create_bar(&mut self, close: f64, timestamp: DateTime<Utc>) -> Bar {
        let noise_pct = 0.002; // ±0.2% intrabar movement

        let high = close * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = close * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let open = (close * (1.0 + self.rng.gen_range(-noise_pct..noise_pct))).clamp(low, high);

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}
