// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:      Configuration structs loaded from JSON
// - schema:      Quote field table, records and snapshots
// - error:       Refresh failure taxonomy
// - util:        Shared helpers (symbol handling, time)
// - registry:    Ordered set of tracked symbols
// - source:      Quote fetch capability + HTTP implementation
// - coordinator: Refresh cycle, retry / warm-up timers, debouncing
// - consumer:    In-process reader that votes for FX symbols
// - metrics:     Global runtime counters
//
mod config;
mod consumer;
mod coordinator;
mod error;
mod metrics;
mod registry;
mod schema;
mod source;
mod util;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::sleep;

use config::Config;
use consumer::QuoteConsumer;
use coordinator::{CoordinatorSettings, UpdateCoordinator};
use metrics::METRICS;
use source::YahooQuoteSource;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Load configuration
// - Build the quote source and the update coordinator
// - Run the startup refresh before consumers are wired up
// - Start the scan interval, consumer and metrics reporter
// - Serve operator commands until stdin closes or Ctrl-C
//
#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config: Config = config::load_config(&path)?;

    init_logging(&config);

    let definitions = config.symbol_definitions()?;
    let scan_interval = config.scan_interval()?;
    let settings = CoordinatorSettings::from(&config.timings);

    let source = Arc::new(YahooQuoteSource::new(&config.endpoint, settings.fetch_timeout)?);

    let coordinator = UpdateCoordinator::new(
        definitions.iter().map(|d| d.symbol.clone()),
        source,
        settings,
    );

    info!(
        "Requesting data from coordinator with update interval of {:?}.",
        scan_interval
    );
    if !coordinator.first_refresh().await {
        warn!("Starting without quote data");
    }

    if let Some(period) = scan_interval {
        coordinator.spawn_interval(period);
    }

    QuoteConsumer::new(coordinator.clone(), definitions).spawn();

    // --------------------------------------------------------
    // Metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    tokio::spawn(async {
        loop {
            sleep(Duration::from_secs(60)).await;
            info!("[METRICS] {}", METRICS.summary());
        }
    });

    tokio::select! {
        res = run_commands(coordinator.clone(), BufReader::new(tokio::io::stdin())) => res?,
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let default = if config.debug_log() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

// ------------------------------------------------------------
// Operator commands
// ------------------------------------------------------------
//
// One command per stdin line:
// - refresh       request a (debounced) refresh
// - add <SYMBOL>  start tracking a symbol
// - show          print the current snapshot
// - status        print symbols, phase and pending timer
// - quit          exit
//
// `quit` is the only way out through this channel. Closed input
// (service managers, `< /dev/null`) leaves the coordinator running
// until Ctrl-C.
//
#[derive(Debug, PartialEq, Eq)]
enum CommandsEnd {
    Quit,
    Closed,
}

async fn run_commands<R>(coordinator: Arc<UpdateCoordinator>, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    if read_commands(&coordinator, reader).await? == CommandsEnd::Closed {
        info!("Command input closed, running until Ctrl-C");
        std::future::pending::<()>().await;
    }
    Ok(())
}

async fn read_commands<R>(coordinator: &UpdateCoordinator, reader: R) -> Result<CommandsEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("refresh"), _) => {
                info!("Processing refresh_symbols");
                coordinator.request_refresh();
            }
            (Some("add"), Some(symbol)) => {
                if !coordinator.add_symbol(symbol) {
                    info!("{} is already tracked", symbol);
                }
            }
            (Some("show"), _) => match coordinator.data() {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&*snapshot)?),
                None => println!("no data (last update success: {})", coordinator.last_update_success()),
            },
            (Some("status"), _) => println!(
                "symbols={:?} phase={:?} timer={:?} last_update_success={} last_success_at={:?}",
                coordinator.get_symbols(),
                coordinator.phase(),
                coordinator.armed_timer(),
                coordinator.last_update_success(),
                coordinator.subscribe().borrow().last_success_at,
            ),
            (Some("quit"), _) => return Ok(CommandsEnd::Quit),
            (None, _) => {}
            _ => warn!("Unknown command: {}", line.trim()),
        }
    }

    Ok(CommandsEnd::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::Value;
    use tokio::time::timeout;

    use crate::source::QuoteSource;

    /// Source whose endpoint is unreachable.
    #[derive(Default)]
    struct DeadSource {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl QuoteSource for DeadSource {
        fn name(&self) -> &'static str {
            "dead"
        }

        async fn fetch(&self, _symbols: &[String]) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    fn coordinator(source: &Arc<DeadSource>) -> Arc<UpdateCoordinator> {
        let source: Arc<dyn QuoteSource> = source.clone();
        UpdateCoordinator::new(["BABA"], source, CoordinatorSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn quit_ends_the_command_loop() {
        let source = Arc::new(DeadSource::default());
        let coordinator = coordinator(&source);

        let res = timeout(
            Duration::from_secs(1),
            run_commands(coordinator.clone(), &b"add msft\nstatus\nquit\nadd late\n"[..]),
        )
        .await;

        assert!(matches!(res, Ok(Ok(()))));
        assert_eq!(coordinator.get_symbols(), vec!["BABA", "MSFT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_input_is_reported() {
        let source = Arc::new(DeadSource::default());
        let coordinator = coordinator(&source);

        let end = read_commands(&coordinator, &b"bogus\n\n"[..]).await.unwrap();
        assert_eq!(end, CommandsEnd::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_input_keeps_retries_running() {
        let source = Arc::new(DeadSource::default());
        let coordinator = coordinator(&source);

        assert!(!coordinator.first_refresh().await);

        // startup attempt, the immediate follow-up, then the 20s retry
        let res = timeout(
            Duration::from_secs(60),
            run_commands(coordinator.clone(), &b""[..]),
        )
        .await;

        assert!(res.is_err(), "command loop must outlive closed input");
        assert!(source.calls.load(Ordering::SeqCst) >= 3);
    }
}
