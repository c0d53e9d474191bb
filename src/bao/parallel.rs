//! Parallel Bao encoding: a correctness-preserving parallelization of the
//! leaf-CV phase described in the design notes — partitions are taken at
//! the same `left_len`-directed recursion the sequential encoder uses, so
//! every partition boundary is subtree-aligned by construction (resolving
//! the open question of how the reference `blake3-parallel` worker's equal
//! sharing could silently misalign with subtree boundaries).
//!
//! Threads are spawned with `std::thread::scope` per call, never kept
//! around as a pool: there is no teardown step for callers to remember.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::instrument;

use crate::blake3::chunk::parent_output;
use crate::blake3::compress::{cv_to_bytes, IV, ROOT};
use crate::blake3::hasher::Hash;

use super::tree::encode_into;
use super::{count_chunks, left_len, HEADER_LEN, PARENT_SIZE};

/// Tuning knobs for [`encode_parallel`]. A fresh set of scoped threads is
/// spun up and joined on every call; this is a plain value, not a
/// long-lived pool.
#[derive(Debug, Clone, Copy)]
pub struct ParallelConfig {
    /// Maximum number of additional worker threads in flight at once,
    /// beyond the calling thread.
    pub worker_count: u32,
    /// Inputs at or below this size are encoded sequentially; spinning up
    /// threads for tiny inputs would only add overhead.
    pub parallel_threshold_bytes: u64,
    /// Once a subtree's chunk count drops to this many or fewer, it is
    /// encoded sequentially even if workers remain available.
    pub min_chunks_per_worker: u32,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1) as u32;
        Self {
            worker_count,
            parallel_threshold_bytes: 10 * 1024 * 1024,
            min_chunks_per_worker: 256,
        }
    }
}

/// Encodes `content` exactly as [`super::tree::encode`] would (same bytes,
/// same root hash), but parallelizes the leaf chaining-value computation
/// across scoped worker threads for inputs above
/// `config.parallel_threshold_bytes`.
#[instrument(skip(content, config), fields(len = content.len(), outboard))]
pub fn encode_parallel(content: &[u8], outboard: bool, config: &ParallelConfig) -> (Vec<u8>, Hash) {
    if content.is_empty() || (content.len() as u64) <= config.parallel_threshold_bytes {
        return super::tree::encode(content, outboard);
    }

    let mut out = Vec::with_capacity(HEADER_LEN + content.len());
    out.extend_from_slice(&(content.len() as u64).to_le_bytes());

    let budget = AtomicU32::new(config.worker_count);
    let (body, root_cv) = encode_into_parallel(content, 0, true, outboard, config, &budget);
    out.extend(body);

    (out, Hash::from(cv_to_bytes(root_cv)))
}

fn encode_into_parallel(
    content: &[u8],
    chunk_counter: u64,
    is_root: bool,
    outboard: bool,
    config: &ParallelConfig,
    budget: &AtomicU32,
) -> (Vec<u8>, [u32; 8]) {
    let chunks = count_chunks(content.len() as u64);
    let below_threshold = (content.len() as u64) <= config.parallel_threshold_bytes
        || chunks <= config.min_chunks_per_worker as u64
        || content.len() <= crate::blake3::compress::CHUNK_LEN;

    if below_threshold {
        let mut scratch = Vec::new();
        let cv = encode_into(content, chunk_counter, is_root, outboard, &mut scratch);
        return (scratch, cv);
    }

    let claimed = budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| {
            if b > 0 {
                Some(b - 1)
            } else {
                None
            }
        })
        .is_ok();

    let split = left_len(content.len() as u64) as usize;
    let (left, right) = content.split_at(split);
    let left_chunks = count_chunks(split as u64);

    let (left_result, right_result) = if claimed {
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let result = encode_into_parallel(left, chunk_counter, false, outboard, config, budget);
                budget.fetch_add(1, Ordering::SeqCst);
                result
            });
            let right_result =
                encode_into_parallel(right, chunk_counter + left_chunks, false, outboard, config, budget);
            let left_result = handle.join().expect("bao worker thread panicked");
            (left_result, right_result)
        })
    } else {
        let left_result = encode_into_parallel(left, chunk_counter, false, outboard, config, budget);
        let right_result =
            encode_into_parallel(right, chunk_counter + left_chunks, false, outboard, config, budget);
        (left_result, right_result)
    };

    let (left_bytes, left_cv) = left_result;
    let (right_bytes, right_cv) = right_result;

    let mut out = Vec::with_capacity(PARENT_SIZE + left_bytes.len() + right_bytes.len());
    out.extend_from_slice(&cv_to_bytes(left_cv));
    out.extend_from_slice(&cv_to_bytes(right_cv));
    out.extend(left_bytes);
    out.extend(right_bytes);

    let flags = if is_root { ROOT } else { 0 };
    let cv = parent_output(left_cv, right_cv, IV, flags).chaining_value();
    (out, cv)
}
