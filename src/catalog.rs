use std::fmt;

// (ticker, market-data id)
const ASSETS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("ADA", "cardano"),
    ("DOT", "polkadot"),
    ("UNI", "uniswap"),
    ("AAVE", "aave"),
];

/// Canonical ticker of a supported asset, e.g. `BTC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetSymbol(String);

impl AssetSymbol {
    /// Wraps a ticker read back from the store. Catalog membership is only
    /// checked when a rule is created.
    pub fn from_stored(symbol: &str) -> Self {
        Self(symbol.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct SymbolCatalog;

impl SymbolCatalog {
    /// Resolves a ticker or full name (any case) to its canonical ticker.
    pub fn resolve(input: &str) -> Option<AssetSymbol> {
        let input = input.trim();
        ASSETS
            .iter()
            .find(|(ticker, name)| ticker.eq_ignore_ascii_case(input) || name.eq_ignore_ascii_case(input))
            .map(|(ticker, _)| AssetSymbol(ticker.to_string()))
    }

    /// Market-data id for a ticker (`BTC` -> `bitcoin`).
    pub fn full_name(symbol: &AssetSymbol) -> Option<&'static str> {
        ASSETS
            .iter()
            .find(|(ticker, _)| *ticker == symbol.as_str())
            .map(|(_, name)| *name)
    }

    pub fn entries() -> impl Iterator<Item = (&'static str, &'static str)> {
        ASSETS.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_ticker_and_full_name_case_insensitively() {
        assert_eq!(SymbolCatalog::resolve("btc").unwrap().as_str(), "BTC");
        assert_eq!(SymbolCatalog::resolve("Bitcoin").unwrap().as_str(), "BTC");
        assert_eq!(SymbolCatalog::resolve(" aave ").unwrap().as_str(), "AAVE");
    }

    #[test]
    fn unknown_asset_is_not_supported() {
        assert!(SymbolCatalog::resolve("doge").is_none());
        assert!(SymbolCatalog::resolve("").is_none());
    }

    #[test]
    fn full_name_maps_back_from_ticker() {
        let eth = SymbolCatalog::resolve("eth").unwrap();
        assert_eq!(SymbolCatalog::full_name(&eth), Some("ethereum"));
        assert_eq!(SymbolCatalog::full_name(&AssetSymbol::from_stored("XYZ")), None);
    }
}
