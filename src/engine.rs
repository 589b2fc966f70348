use crate::catalog::AssetSymbol;
use crate::notify::{Notification, Notifier};
use crate::price::PriceSource;
use crate::store::{RuleStore, StoreError};
use futures_util::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, warn};

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub visited: usize,
    pub closed: usize,
    /// Active rules left untouched because their asset had no price this pass.
    pub skipped: usize,
    pub notified: usize,
}

pub struct RuleEngine {
    store: Arc<RuleStore>,
    prices: Arc<dyn PriceSource>,
    notifier: Arc<dyn Notifier>,
    quote: String,
}

impl RuleEngine {
    pub fn new(
        store: Arc<RuleStore>,
        prices: Arc<dyn PriceSource>,
        notifier: Arc<dyn Notifier>,
        quote: &str,
    ) -> Self {
        Self {
            store,
            prices,
            notifier,
            quote: quote.to_string(),
        }
    }

    /// Scan, evaluate and rewrite the whole store once.
    ///
    /// Prices are fetched before the store lock is taken for the rewrite, so a
    /// slow price API never blocks rule creation. Notifications go out only
    /// after the rewrite has committed.
    pub async fn evaluate_pass(&self) -> Result<PassReport, StoreError> {
        let assets: BTreeSet<AssetSymbol> = self
            .store
            .snapshot()
            .await?
            .into_iter()
            .filter(|r| r.is_active())
            .map(|r| r.asset)
            .collect();

        let prices = self.fetch_prices(assets).await;

        let mut pending = Vec::new();
        let mut skipped = 0;
        let visited = self
            .store
            .scan_and_rewrite(|mut rule| {
                if !rule.is_active() {
                    return rule;
                }
                match prices.get(&rule.asset) {
                    Some(&price) if rule.matches(price) => {
                        rule.close();
                        pending.push(Notification::from_rule(&rule, price));
                    }
                    Some(_) => {}
                    None => skipped += 1,
                }
                rule
            })
            .await?;

        let closed = pending.len();
        let mut notified = 0;
        for notification in &pending {
            match self.notifier.notify(notification).await {
                Ok(()) => notified += 1,
                Err(e) => error!(
                    owner = %notification.owner,
                    asset = %notification.asset,
                    "Alert closed but notification failed: {:#}", e
                ),
            }
        }

        Ok(PassReport {
            visited,
            closed,
            skipped,
            notified,
        })
    }

    /// One request per distinct asset, issued concurrently. Failed assets are
    /// absent from the result.
    async fn fetch_prices(&self, assets: BTreeSet<AssetSymbol>) -> HashMap<AssetSymbol, f64> {
        let quote = self.quote.as_str();
        let results = join_all(assets.into_iter().map(|asset| async move {
            let price = self.prices.get_price(&asset, quote).await;
            (asset, price)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(asset, price)| match price {
                Ok(p) => Some((asset, p)),
                Err(e) => {
                    warn!(asset = %asset, "Price fetch failed, rules kept active: {:#}", e);
                    None
                }
            })
            .collect()
    }
}
