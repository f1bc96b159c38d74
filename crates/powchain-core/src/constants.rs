/// Sentinel used both as the genesis hash and as the genesis `previous_hash`.
pub const GENESIS_HASH: &str = "0";
pub const DEFAULT_DIFFICULTY: usize = 2;
/// Beyond this many leading zero hex digits a sequential search is hopeless.
pub const MAX_PRACTICAL_DIFFICULTY: usize = 8;
/// Counters handed to the rayon pool per round of parallel mining.
pub const SEARCH_BATCH: usize = 1 << 14;
