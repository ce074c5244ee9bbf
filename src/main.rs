use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use perpbot::api::{fetch_with_timeout, HyperliquidClient};
use perpbot::backtest::{load_bars_csv, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use perpbot::classifier::{Classifier, ForestClassifier};
use perpbot::config::BotConfig;
use perpbot::engine::{EngineSettings, TradingEngine};
use perpbot::execution::{PaperVenue, Portfolio};
use perpbot::features::latest_features;
use perpbot::notify::{LogNotifier, Notifications, Notifier, TelegramNotifier};
use perpbot::strategy::SignalGenerator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "perpbot",
    version,
    about = "Classifier-driven paper trading for Hyperliquid perpetuals"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the paper-trading loop (default).
    Run,
    /// Replay historical or synthetic bars through the trading engine.
    Backtest {
        /// CSV with timestamp,open,high,low,close,volume rows. Synthetic bars when omitted.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Synthetic market shape.
        #[arg(long, value_enum, default_value_t = MarketScenario::Volatile)]
        scenario: MarketScenario,

        /// Synthetic series length.
        #[arg(long, default_value_t = 1000)]
        bars: usize,

        /// RNG seed for the synthetic series.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Fetch the latest candles once and print the current signal. Places no orders.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = BotConfig::load().context("Failed to load configuration")?;
    tracing::info!("Config: {}", config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Backtest {
            csv,
            scenario,
            bars,
            seed,
        } => backtest(config, csv, scenario, bars, seed).await,
        Commands::Check => check(config).await,
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("perpbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn load_classifier(config: &BotConfig) -> Result<Arc<dyn Classifier>> {
    let forest = ForestClassifier::load(&config.strategy.model_path)
        .context("Cannot start without a usable model artifact")?;
    Ok(Arc::new(forest))
}

fn create_notifier(config: &BotConfig) -> Result<Arc<dyn Notifier>> {
    match config.notify.telegram() {
        Some((token, chat_id)) => {
            tracing::info!("Telegram notifications enabled");
            Ok(Arc::new(TelegramNotifier::new(
                token.to_string(),
                chat_id.to_string(),
            )))
        }
        None => {
            tracing::warn!(
                "TELEGRAM_TOKEN / TELEGRAM_CHAT_ID not set, notifications go to the log"
            );
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn create_market_client(config: &BotConfig) -> Result<HyperliquidClient> {
    HyperliquidClient::with_base_url(&config.market.api_url)
        .context("Failed to build Hyperliquid client")
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config: BotConfig) -> Result<()> {
    tracing::info!("🚀 perpbot starting");

    let classifier = load_classifier(&config)?;
    let market = Arc::new(create_market_client(&config)?);
    let notifications = Notifications::new(create_notifier(&config)?, config.engine.call_timeout());

    let mut engine = TradingEngine::new(
        market,
        Arc::new(PaperVenue::new()),
        notifications,
        SignalGenerator::new(classifier, config.strategy.threshold),
        Portfolio::new(
            config.risk.initial_balance,
            config.risk.parameters(),
            chrono::Utc::now(),
        ),
        EngineSettings::from(&config),
    );

    engine.announce().await;
    tracing::info!("Press Ctrl+C to stop...");

    engine
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        })
        .await;

    let snapshot = engine.portfolio().snapshot();
    tracing::info!(
        "👋 perpbot stopped | balance ${:.2} | P&L ${:.2} | {} trades, {} open",
        snapshot.balance,
        snapshot.net_pnl,
        snapshot.total_trades,
        snapshot.open_trades
    );
    Ok(())
}

async fn backtest(
    config: BotConfig,
    csv: Option<PathBuf>,
    scenario: MarketScenario,
    num_bars: usize,
    seed: u64,
) -> Result<()> {
    let classifier = load_classifier(&config)?;

    let (bars, source) = match csv {
        Some(path) => {
            let bars = load_bars_csv(&path)
                .with_context(|| format!("Failed to load bars from {}", path.display()))?;
            (bars, path.display().to_string())
        }
        None => {
            let interval = perpbot::api::timeframe_duration(&config.market.timeframe)
                .map(|d| d.num_minutes())
                .unwrap_or(15);
            let bars = SyntheticDataGenerator::new(seed).generate(scenario, num_bars, interval);
            (bars, format!("synthetic {:?} (seed {})", scenario, seed))
        }
    };

    BacktestRunner::from_config(&config)
        .run_and_report(classifier, bars, &source)
        .await?;
    Ok(())
}

async fn check(config: BotConfig) -> Result<()> {
    let classifier = load_classifier(&config)?;
    let client = create_market_client(&config)?;

    println!(
        "\n🔍 Fetching {} {} candles for {} from {}",
        config.market.candle_limit,
        config.market.timeframe,
        config.market.symbol,
        client.base_url()
    );

    let bars = fetch_with_timeout(
        &client,
        &config.market.symbol,
        &config.market.timeframe,
        config.market.candle_limit,
        config.engine.call_timeout(),
    )
    .await
    .context("Candle fetch failed")?;

    println!(
        "{:<22} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "Time", "Open", "High", "Low", "Close", "Volume"
    );
    println!("{}", "─".repeat(88));
    for bar in bars.iter().rev().take(5).rev() {
        println!(
            "{:<22} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.4}",
            bar.timestamp.format("%Y-%m-%d %H:%M"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        );
    }

    match latest_features(&bars) {
        Some(features) => {
            let signals = SignalGenerator::new(classifier, config.strategy.threshold);
            let evaluation = signals.evaluate(&features);
            println!("\n📐 Features: {:?}", features);
            println!(
                "🧠 P(buy) {:.3} | P(sell) {} | decision {:?}",
                evaluation.buy_probability,
                evaluation
                    .sell_probability
                    .map_or_else(|| "-".to_string(), |p| format!("{:.3}", p)),
                evaluation.decision
            );
        }
        None => println!("\n⚠️  Latest feature row is incomplete, no signal this bar"),
    }

    println!("\n✅ Connection OK ({} candles)", bars.len());
    Ok(())
}
