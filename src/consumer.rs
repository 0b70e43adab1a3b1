use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::config::SymbolDefinition;
use crate::coordinator::{RefreshState, UpdateCoordinator};
use crate::schema::{QuoteField, Snapshot};
use crate::util;

/// In-process reader of coordinator data.
///
/// For every configured symbol it:
/// - Reports the latest price, or that data is stale / missing
/// - Votes for the FX pair needed to convert into the symbol's
///   target currency
///
/// The consumer never fetches; missing symbols are handed to
/// `add_symbol` and show up after the coordinator's warm-up refresh.
pub struct QuoteConsumer {
    coordinator: Arc<UpdateCoordinator>,
    definitions: Vec<SymbolDefinition>,
}

impl QuoteConsumer {
    pub fn new(coordinator: Arc<UpdateCoordinator>, definitions: Vec<SymbolDefinition>) -> Self {
        Self { coordinator, definitions }
    }

    /// FX symbols required by `snapshot` that are not tracked yet.
    ///
    /// A symbol needs conversion when a target currency is set and
    /// differs from the currency it is quoted in.
    pub fn missing_conversions(&self, snapshot: &Snapshot) -> Vec<String> {
        let mut out = Vec::new();

        for def in &self.definitions {
            let Some(target) = def.target_currency.as_deref() else {
                continue;
            };
            let Some(currency) = snapshot
                .get(&def.symbol)
                .and_then(|r| r.text(QuoteField::Currency))
            else {
                continue;
            };
            if currency.eq_ignore_ascii_case(target) {
                continue;
            }

            let fx = util::fx_symbol(currency, target);
            if !self.coordinator.is_tracked(&fx) && !out.contains(&fx) {
                out.push(fx);
            }
        }

        out
    }

    /// Handles one published state: report, then vote for FX pairs.
    pub fn observe(&self, state: &RefreshState) {
        let Some(snapshot) = state.snapshot.as_deref() else {
            warn!("No quote data available yet");
            return;
        };

        if !state.last_update_success {
            warn!("Last update failed, showing stale data");
        }

        for def in &self.definitions {
            match snapshot.get(&def.symbol) {
                Some(record) => info!(
                    "{} ({}) {} {}",
                    def.symbol,
                    record.text(QuoteField::ShortName).unwrap_or(&def.symbol),
                    record.price(),
                    record.text(QuoteField::Currency).unwrap_or("-"),
                ),
                None => debug!("{} not in snapshot yet", def.symbol),
            }

            if let Some(date) = snapshot.get(&def.symbol).and_then(|r| r.dividend_date()) {
                debug!("{} dividend date {}", def.symbol, date);
            }
        }

        for fx in self.missing_conversions(snapshot) {
            self.coordinator.add_symbol(&fx);
        }
    }

    /// Watches coordinator state until the coordinator goes away.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut rx = self.coordinator.subscribe();
            loop {
                let state = rx.borrow_and_update().clone();
                self.observe(&state);

                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
