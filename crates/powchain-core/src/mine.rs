use crate::{
    constants::SEARCH_BATCH,
    pow::{hash_with_counter, meets_difficulty},
    Block, ChainError,
};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Mines `block` by searching proof counters in parallel, starting from its
/// current counter.
///
/// Counters are handed out in batches of [`SEARCH_BATCH`]; each batch is split
/// across the rayon pool and searched in order, so the winning counter is the
/// smallest satisfying one and the result matches [`Block::mine`]. Setting
/// `cancel` stops every worker; the block is then left unmined and
/// `ChainError::Cancelled` is returned.
pub fn mine_parallel(
    block: &mut Block,
    difficulty: usize,
    cancel: &AtomicBool,
) -> Result<(), ChainError> {
    // Everything but the counter is fixed while mining.
    let prefix = block.hash_prefix()?;
    let counter = find_counter(block.proof_counter, cancel, |counter| {
        meets_difficulty(&hash_with_counter(&prefix, counter), difficulty)
    })
    .ok_or(ChainError::Cancelled)?;

    let hash = hash_with_counter(&prefix, counter);
    debug!(
        "parallel search settled on proof counter {} with hash {}",
        counter, hash
    );
    block.proof_counter = counter;
    block.hash = hash;
    Ok(())
}

/// Smallest counter from `start` upward for which `is_hit` holds, or `None`
/// once `cancel` is set.
fn find_counter<F>(start: u64, cancel: &AtomicBool, is_hit: F) -> Option<u64>
where
    F: Fn(u64) -> bool + Sync,
{
    let mut lo = start;
    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!("parallel mining cancelled at counter {}", lo);
            return None;
        }
        // A set flag makes every probe "match", which ends the batch quickly.
        let found = (0..SEARCH_BATCH)
            .into_par_iter()
            .map(move |offset| lo.wrapping_add(offset as u64))
            .find_first(|counter| cancel.load(Ordering::Relaxed) || is_hit(*counter));

        match found {
            Some(counter) if is_hit(counter) => return Some(counter),
            Some(_) => {
                debug!("parallel mining cancelled in batch starting at {}", lo);
                return None;
            }
            None => lo = lo.wrapping_add(SEARCH_BATCH as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constants::GENESIS_HASH, Payload};
    use std::{
        collections::HashSet,
        sync::Mutex,
        thread,
        time::Duration,
    };

    fn candidate() -> Block {
        let mut block = Block::new(
            GENESIS_HASH,
            Payload::new().with("from", "Alice").with("to", "Bob").with("amount", 5),
        );
        block.timestamp = 1_600_000_000_000;
        block
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut sequential = candidate();
        sequential.mine(3).unwrap();

        let mut parallel = candidate();
        mine_parallel(&mut parallel, 3, &AtomicBool::new(false)).unwrap();

        assert_eq!(parallel.proof_counter, sequential.proof_counter);
        assert_eq!(parallel.hash, sequential.hash);
    }

    #[test]
    fn parallel_starts_from_current_counter() {
        let mut block = candidate();
        block.proof_counter = 656;
        mine_parallel(&mut block, 2, &AtomicBool::new(false)).unwrap();
        assert!(block.proof_counter >= 656);
        assert!(block.hash.starts_with("00"));
        assert_eq!(block.compute_hash().unwrap(), block.hash);
    }

    #[test]
    fn preset_cancel_flag_aborts() {
        let mut block = candidate();
        let err = mine_parallel(&mut block, 64, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, ChainError::Cancelled));
        assert!(block.hash.is_empty());
        assert_eq!(block.proof_counter, 0);
    }

    #[test]
    fn cancel_from_another_thread() {
        let cancel = AtomicBool::new(false);
        let mut block = candidate();
        let result = thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                cancel.store(true, Ordering::Relaxed);
            });
            // 64 leading zeros is never found
            mine_parallel(&mut block, 64, &cancel)
        });
        assert!(matches!(result, Err(ChainError::Cancelled)));
        assert!(block.hash.is_empty());
    }

    #[test]
    fn unencodable_payload_fails_before_search() {
        let mut block = Block::new(GENESIS_HASH, Payload::new().with("amount", f64::NAN));
        let err = mine_parallel(&mut block, 1, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, ChainError::Serialization(_)));
    }

    #[test]
    fn search_is_spread_across_workers() {
        let mut sequential = candidate();
        sequential.mine(4).unwrap();
        let answer = sequential.proof_counter;
        // the batch containing the answer is not the first, so several batches run
        assert!(answer > SEARCH_BATCH as u64);

        let prefix = sequential.hash_prefix().unwrap();
        let workers = Mutex::new(HashSet::new());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        let found = pool.install(|| {
            find_counter(0, &AtomicBool::new(false), |counter| {
                if counter < answer {
                    workers
                        .lock()
                        .unwrap()
                        .insert(rayon::current_thread_index());
                }
                meets_difficulty(&hash_with_counter(&prefix, counter), 4)
            })
        });

        assert_eq!(found, Some(answer));
        let workers = workers.into_inner().unwrap();
        assert!(
            workers.len() > 1,
            "only {:?} evaluated counters below the answer",
            workers
        );
    }
}
