use std::time::Duration;

use raceboard::api::OrdersClient;
use raceboard::feeds::ConnectionStatus;
use raceboard::metrics::DisplayMarket;
use raceboard::{BoardSnapshot, Config, Runtime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const CONFIG_ENV: &str = "RACEBOARD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load_or_default(&path)?;
    cfg.logging.init();
    info!(path = %path, "Loaded config");

    let (runtime, board_rx) = Runtime::new(cfg.clone());

    tokio::spawn(render(board_rx));
    if let Some(api_url) = cfg.orders.api_url.clone() {
        let every = Duration::from_millis(cfg.orders.poll_interval_ms);
        tokio::spawn(poll_orders(OrdersClient::new(api_url), every));
    }

    println!("\nStarting race board... (Ctrl+C to quit)\n");
    runtime
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    Ok(())
}

// Reprint the board whenever it changes
async fn render(mut board_rx: watch::Receiver<BoardSnapshot>) {
    while board_rx.changed().await.is_ok() {
        let snapshot = board_rx.borrow_and_update().clone();
        print_board(&snapshot);
    }
}

fn print_board(snapshot: &BoardSnapshot) {
    let status = match &snapshot.status {
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::Reconnecting { attempt, delay } => {
            format!("reconnecting (attempt {}, {:?})", attempt, delay)
        }
        ConnectionStatus::Abandoned { attempts } => {
            format!("DISCONNECTED after {} attempts", attempts)
        }
        other => format!("{:?}", other).to_lowercase(),
    };

    println!("==== {} markets | feed {} ====", snapshot.markets.len(), status);
    for market in snapshot.render() {
        print_market(&market);
    }
}

fn print_market(market: &DisplayMarket) {
    let flag = if market.highlighted { "!!" } else { "  " };
    let secs = market
        .seconds_to_start
        .map(|s| format!("{:>6.0}s", s))
        .unwrap_or_else(|| "     ?s".to_string());
    println!(
        "{} {} {:<32} back:{} lay:{} last:{}",
        flag,
        secs,
        market.title.as_deref().unwrap_or(&market.market_id),
        fmt_opt(market.overrun_back),
        fmt_opt(market.overrun_lay),
        fmt_opt(market.overrun_last),
    );

    for quote in &market.entities {
        println!(
            "      {:<24} b:{} l:{} t:{}",
            quote.display_name.as_deref().unwrap_or(&quote.entity_id),
            fmt_opt(quote.back),
            fmt_opt(quote.lay),
            fmt_opt(quote.last),
        );
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:>6.2}", v),
        None => "     -".to_string(),
    }
}

async fn poll_orders(client: OrdersClient, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    let mut last_count = None;
    loop {
        ticker.tick().await;
        match client.open_orders().await {
            Ok(rows) => {
                if last_count != Some(rows.len()) {
                    info!(open = rows.len(), "Open orders");
                    last_count = Some(rows.len());
                }
                debug!(?rows, "Open order rows");
            }
            Err(e) => warn!(error = %e, url = client.base_url(), "Failed to fetch open orders"),
        }
    }
}
