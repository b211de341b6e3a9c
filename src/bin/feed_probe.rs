use std::time::Instant;

use futures_util::StreamExt;
use raceboard::feeds::parse_frame_bytes;
use raceboard::Config;
use tokio_tungstenite::connect_async;

const SAMPLES: usize = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let url = match std::env::args().nth(1) {
        Some(url) => url,
        None => Config::load_or_default("config.toml")?.feed.url,
    };

    println!("Connecting to {}...", url);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (_, mut read) = ws.split();

    println!("Connected. Measuring parse time for {} frames...\n", SAMPLES);

    let mut times: Vec<u128> = Vec::with_capacity(SAMPLES);
    let mut markets = 0;

    while let Some(msg) = read.next().await {
        let text = match msg? {
            tungstenite::Message::Text(text) => text,
            _ => continue,
        };

        let start = Instant::now();
        let mut bytes = text.into_bytes();
        match parse_frame_bytes(&mut bytes) {
            Ok(frame) => {
                let elapsed = start.elapsed().as_nanos();
                times.push(elapsed);
                markets = frame.markets.len();

                let count = times.len();
                if count <= 5 || count % 20 == 0 {
                    println!(
                        "#{}: {}ns ({}μs), {} markets, {} rejected",
                        count,
                        elapsed,
                        elapsed / 1000,
                        markets,
                        frame.rejected.len()
                    );
                }
                if count >= SAMPLES {
                    break;
                }
            }
            Err(e) => println!("Unparseable frame: {}", e),
        }
    }

    if times.is_empty() {
        println!("No frames received");
        return Ok(());
    }

    // Stats
    times.sort();
    let sum: u128 = times.iter().sum();
    let avg = sum / times.len() as u128;
    let min = times[0];
    let max = times[times.len() - 1];
    let median = times[times.len() / 2];
    let p99 = times[(times.len() * 99 / 100).min(times.len() - 1)];

    println!("\n=== FEED PARSE LATENCY ({} frames, {} markets) ===", times.len(), markets);
    println!("Min:    {}ns ({}μs)", min, min / 1000);
    println!("Max:    {}ns ({}μs)", max, max / 1000);
    println!("Avg:    {}ns ({}μs)", avg, avg / 1000);
    println!("Median: {}ns ({}μs)", median, median / 1000);
    println!("P99:    {}ns ({}μs)", p99, p99 / 1000);
    Ok(())
}
