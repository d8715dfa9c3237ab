use std::collections::BTreeMap;

use serde::Serialize;

/// Raw request counters kept by the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    /// Requests answered from a live entry.
    pub hits: u64,
    /// Requests that started a load.
    pub misses: u64,
    /// Loads handed to the gateway.
    pub loads: u64,
    /// Requests that joined a load already in flight.
    pub coalesced: u64,
    /// Entries currently stored, live or not yet evicted.
    pub entries: usize,
}

/// Snapshot of cache effectiveness plus the record count of each named slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub load_count: u64,
    pub coalesced: u64,
    pub cached_entry_count: usize,
    /// `None` until at least one hit or miss has been recorded.
    pub hit_rate: Option<f64>,
    pub per_list_counts: BTreeMap<String, usize>,
}

impl CacheStats {
    pub fn new(counters: CacheCounters, per_list_counts: BTreeMap<String, usize>) -> Self {
        let requests = counters.hits + counters.misses;
        let hit_rate = if requests == 0 {
            None
        } else {
            Some(counters.hits as f64 / requests as f64)
        };
        Self {
            hits: counters.hits,
            misses: counters.misses,
            load_count: counters.loads,
            coalesced: counters.coalesced,
            cached_entry_count: counters.entries,
            hit_rate,
            per_list_counts,
        }
    }

    /// Hit rate as a percentage string, or "n/a" before any request.
    pub fn hit_rate_display(&self) -> String {
        match self.hit_rate {
            Some(rate) => format!("{:.1}%", rate * 100.0),
            None => "n/a".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_undefined_without_requests() {
        let stats = CacheStats::new(CacheCounters::default(), BTreeMap::new());
        assert_eq!(stats.hit_rate, None);
        assert_eq!(stats.hit_rate_display(), "n/a");
    }

    #[test]
    fn test_hit_rate() {
        let counters = CacheCounters {
            hits: 3,
            misses: 1,
            loads: 1,
            coalesced: 2,
            entries: 1,
        };
        let stats = CacheStats::new(counters, BTreeMap::new());
        assert_eq!(stats.hit_rate, Some(0.75));
        assert_eq!(stats.hit_rate_display(), "75.0%");
        assert_eq!(stats.load_count, 1);
    }

    #[test]
    fn test_serializes_camel_case() {
        let stats = CacheStats::new(CacheCounters::default(), BTreeMap::new());
        let json = serde_json::to_value(&stats).expect("json");
        assert!(json.get("hitRate").is_some());
        assert!(json.get("perListCounts").is_some());
    }
}
