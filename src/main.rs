use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;

use crossbot::api::OkxClient;
use crossbot::config::{BotConfig, WalletConfig};
use crossbot::execution::{Broker, LiveBroker, PaperBroker};
use crossbot::feed::MarketDataFeed;
use crossbot::models::{Event, OrderStatus, OrderUpdate};
use crossbot::strategy::StrategyController;
use crossbot::Result;

#[derive(Debug, Parser)]
#[command(name = "crossbot", about = "Dual-EMA crossover market-order bot")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Trade against the simulated paper broker instead of the live venue
    #[arg(long)]
    paper: bool,

    /// Starting cash for the paper broker, in quote currency
    #[arg(long, default_value_t = 10_000.0)]
    paper_cash: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let cfg = BotConfig::load(args.config.as_deref())?;

    tracing::info!("crossbot starting");
    tracing::info!(
        "  symbol: {} ({}m bars, backfill {})",
        cfg.feed.symbol,
        cfg.feed.timeframe_minutes,
        cfg.feed.backfill_bars
    );
    tracing::info!(
        "  EMAs: {}/{}, trade size {}, hold {} bars",
        cfg.strategy.fast_period,
        cfg.strategy.slow_period,
        cfg.strategy.trade_size,
        cfg.strategy.min_hold_bars
    );
    tracing::info!("  mode: {}", if args.paper { "paper" } else { "live" });

    let client = Arc::new(OkxClient::new(&cfg.exchange)?);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let feed = MarketDataFeed::new(client.clone(), events_tx.clone(), cfg.feed.clone());
    let feed_task = tokio::spawn(feed.run());

    let controller = StrategyController::new(cfg.feed.symbol.clone(), cfg.strategy.clone());

    let run = async {
        if args.paper {
            let broker = PaperBroker::new(
                events_tx.clone(),
                cfg.feed.symbol.clone(),
                cfg.wallet.quote_asset.clone(),
                cfg.wallet.base_asset.clone(),
                args.paper_cash,
            );
            run_loop(controller, broker, events_rx, cfg.wallet.clone()).await
        } else {
            if !cfg.exchange.has_credentials() {
                return Err(
                    "live trading needs exchange credentials; pass --paper to simulate".into(),
                );
            }
            let broker = LiveBroker::new(
                client.clone(),
                events_tx.clone(),
                cfg.feed.symbol.clone(),
                cfg.exchange.retries,
            );
            run_loop(controller, broker, events_rx, cfg.wallet.clone()).await
        }
    };

    tokio::select! {
        result = run => {
            feed_task.abort();
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down...");
            feed_task.abort();
        }
    }

    tracing::info!("crossbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossbot=info".into()),
        )
        .init();
}

/// Single-threaded event dispatch: every feed and broker event flows through
/// here and into the controller, one at a time
async fn run_loop<B: Broker>(
    mut controller: StrategyController,
    mut broker: B,
    mut events: mpsc::UnboundedReceiver<Event>,
    wallet: WalletConfig,
) -> Result<()> {
    while let Some(event) = events.recv().await {
        if matches!(event, Event::Bar(_)) && controller.is_live() {
            // Skipped during backfill; the extra round trips only slow the
            // replay down
            log_wallets(&broker, &wallet).await?;
        }

        if let Some(intent) = controller.handle_event(&event) {
            if let Err(e) = broker.submit(&intent).await {
                tracing::error!("order submission failed: {}", e);
                // Log-and-clear, no retry: surface the failure to the
                // controller as a rejection so the next bar can act again
                controller.on_order_update(&OrderUpdate {
                    client_id: intent.client_id,
                    exchange_id: None,
                    side: intent.side,
                    status: OrderStatus::Rejected,
                    price: 0.0,
                    filled_qty: 0.0,
                    cost: 0.0,
                    fee: 0.0,
                });
            }
        }
    }

    Ok(())
}

/// Balance snapshot logged with each live bar; a never-funded wallet is a
/// hard fault and halts the run
async fn log_wallets<B: Broker>(broker: &B, wallet: &WalletConfig) -> Result<()> {
    let (quote_avail, _) = broker.wallet_balance(&wallet.quote_asset).await?;
    let (base_avail, _) = broker.wallet_balance(&wallet.base_asset).await?;

    tracing::info!(
        "cash {} {:.2} | {} {:.8}",
        wallet.quote_asset,
        quote_avail,
        wallet.base_asset,
        base_avail
    );
    Ok(())
}
