// ============================================================================
// File: src/freq_history.rs
// ----------------------------------------------------------------------------
// Bounded per-network history of recently used frequencies:
// - Timestamped record with oldest-entry eviction per network
// - Age-filtered retrieval that prunes expired entries in place
// - Serde snapshot so an external store layer can persist the cache
// ============================================================================

//! Remembers which frequencies a network was recently seen on.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

/// Frequencies one network was seen on, keyed by MHz with the last time
/// each was observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct PerNetwork {
    freqs: HashMap<u32, DateTime<Utc>>,
}

impl PerNetwork {
    /// Evict least recently seen entries until the map fits `max` again.
    fn trim(&mut self, max: usize, network_id: &str, verbose: bool) {
        while self.freqs.len() > max {
            let oldest = self
                .freqs
                .iter()
                .min_by_key(|(freq, stamp)| (**stamp, **freq))
                .map(|(freq, stamp)| (*freq, *stamp));
            let Some((freq, stamp)) = oldest else {
                return;
            };
            if verbose {
                debug!("evicting {freq} MHz for {network_id}, last seen {stamp}");
            }
            self.freqs.remove(&freq);
        }
    }
}

/// Cache of the frequencies each known network was recently connected on.
///
/// Channel selection consults this to favor frequencies a network actually
/// used before. Entries carry the time they were last observed; each network
/// keeps at most `max_per_network` of them and older ones are evicted first.
/// The whole cache serializes as one snapshot, persistence is the caller's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreqHistory {
    networks: HashMap<String, PerNetwork>,
    max_per_network: usize,
    #[serde(skip)]
    verbose: bool,
}

impl FreqHistory {
    /// Create an empty cache keeping at most `max_per_network` frequencies
    /// per network.
    pub fn new(max_per_network: usize) -> Self {
        Self {
            networks: HashMap::new(),
            max_per_network,
            verbose: false,
        }
    }

    pub fn enable_verbose_logging(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Record that `network_id` was just seen on `freq_mhz`.
    ///
    /// Re-recording a known frequency refreshes its timestamp. When the
    /// network is over capacity afterwards, its oldest entries are evicted.
    pub fn record(&mut self, network_id: &str, freq_mhz: u32) {
        self.record_at(network_id, freq_mhz, Utc::now());
    }

    fn record_at(&mut self, network_id: &str, freq_mhz: u32, at: DateTime<Utc>) {
        if network_id.is_empty() {
            return;
        }
        let network = self.networks.entry(network_id.to_string()).or_default();
        network.freqs.insert(freq_mhz, at);
        network.trim(self.max_per_network, network_id, self.verbose);
    }

    /// Frequencies `network_id` was seen on within the last `max_age`,
    /// sorted ascending. Expired entries are dropped from the cache on the
    /// way. `None` when the network was never recorded.
    pub fn frequencies_seen_within(
        &mut self,
        network_id: &str,
        max_age: Duration,
    ) -> Option<Vec<u32>> {
        let network = self.networks.get_mut(network_id)?;
        let now = Utc::now();
        let verbose = self.verbose;
        network.freqs.retain(|freq, stamp| {
            let keep = now.signed_duration_since(*stamp) <= max_age;
            if !keep && verbose {
                debug!("dropping {freq} MHz for {network_id}, last seen {stamp}");
            }
            keep
        });
        let mut freqs: Vec<u32> = network.freqs.keys().copied().collect();
        freqs.sort_unstable();
        Some(freqs)
    }

    /// Drop everything recorded for `network_id`.
    pub fn forget(&mut self, network_id: &str) {
        if !network_id.is_empty() {
            self.networks.remove(network_id);
        }
    }

    /// Number of networks with recorded history.
    pub fn network_count(&self) -> usize {
        self.networks.len()
    }
}
