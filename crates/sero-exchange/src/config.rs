//! Exchange configuration.

use std::time::Duration;

/// Tunables for the scan and merge jobs.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Interval between scan ticks
    pub scan_interval: Duration,
    /// Interval between merge ticks
    pub merge_interval: Duration,
    /// Whether the auto-merge job runs at all
    pub auto_merge: bool,
    /// Maximum blocks fetched per scan window
    pub fetch_window: u64,
    /// Maximum UTXO candidates a merge sweep will look at
    pub merge_scan_cap: usize,
    /// Minimum candidates before a merge is attempted
    pub merge_min_candidates: usize,
    /// Number of largest coins a merge leaves untouched for direct spends
    pub merge_keep_largest: usize,
    /// Gas limit of a merge transaction
    pub merge_gas: u64,
    /// Gas price of a merge transaction
    pub merge_gas_price: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(10),
            merge_interval: Duration::from_secs(60),
            auto_merge: true,
            fetch_window: 1_000,
            merge_scan_cap: 150,
            merge_min_candidates: 11,
            merge_keep_largest: 8,
            merge_gas: 25_000,
            merge_gas_price: 1_000_000_000,
        }
    }
}
