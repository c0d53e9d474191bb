//! The partial Bao receiver (C7): an append-only, order-independent
//! acceptor of verified chunk groups, backed by a dense bitfield. Sits on
//! top of the Iroh chunk-group variant ([`super::group`]) and consumes
//! verified proofs to fill itself in, in any order a producer happens to
//! deliver them.

use std::collections::HashMap;

use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blake3::chunk::parent_cv;
use crate::blake3::compress::{bytes_to_cv, cv_to_bytes, CHUNK_LEN, IV, ROOT};
use crate::blake3::hasher::Hash;
use crate::constant_time::ct_eq;
use crate::error::{Error, Result};

use super::group::{count_groups, ChunkGroupLog};
use super::left_len_with_unit;

/// A receiver-side accumulator for an Iroh chunk-group Bao encoding. Groups
/// may arrive in any order; each is either trusted outright (from a fully
/// authenticated source) or accompanied by a proof that is verified
/// against `root_hash` before being accepted.
pub struct PartialBao {
    root_hash: Hash,
    content_len: u64,
    chunk_group_log: ChunkGroupLog,
    num_groups: u64,
    received: BitVec<u8, Lsb0>,
    group_data: HashMap<u64, Vec<u8>>,
    proof_nodes: HashMap<u64, Vec<Hash>>,
}

impl PartialBao {
    pub fn new(root_hash: Hash, content_len: u64, chunk_group_log: ChunkGroupLog) -> Self {
        let num_groups = count_groups(content_len, chunk_group_log);
        Self {
            root_hash,
            content_len,
            chunk_group_log,
            num_groups,
            received: BitVec::repeat(false, num_groups as usize),
            group_data: HashMap::new(),
            proof_nodes: HashMap::new(),
        }
    }

    pub fn root_hash(&self) -> &Hash {
        &self.root_hash
    }

    pub fn content_len(&self) -> u64 {
        self.content_len
    }

    pub fn num_groups(&self) -> u64 {
        self.num_groups
    }

    fn group_len(&self) -> u64 {
        self.chunk_group_log.group_len()
    }

    /// Byte range `[start, end)` of group `index` within the content.
    fn group_byte_range(&self, index: u64) -> Result<(u64, u64)> {
        if index >= self.num_groups {
            return Err(Error::InvalidRange(format!(
                "group index {index} out of range (num_groups = {})",
                self.num_groups
            )));
        }
        let start = index * self.group_len();
        let end = (start + self.group_len()).min(self.content_len);
        Ok((start, end))
    }

    fn is_set(&self, index: u64) -> bool {
        self.received[index as usize]
    }

    fn set(&mut self, index: u64) {
        self.received.set(index as usize, true);
    }

    /// Stores `bytes` for `index` without verification. Intended for a
    /// producer that already trusts its own data (e.g. seeding a receiver
    /// from locally held content).
    pub fn add_group_trusted(&mut self, index: u64, bytes: &[u8]) -> Result<()> {
        let (start, end) = self.group_byte_range(index)?;
        let expected_len = (end - start) as usize;
        if bytes.len() != expected_len {
            return Err(Error::MalformedInput(format!(
                "group {index} expected {expected_len} bytes, got {}",
                bytes.len()
            )));
        }
        self.group_data.insert(index, bytes.to_vec());
        self.set(index);
        debug!(index, "accepted trusted group");
        Ok(())
    }

    /// Verifies `bytes` against `root_hash` using `proof` (the ordered
    /// root-to-leaf list of sibling chaining values for this group) and,
    /// on success, stores both the bytes and the proof. Leaves state
    /// untouched on failure. A no-op if the group is already present.
    pub fn add_group_with_proof(&mut self, index: u64, bytes: &[u8], proof: Vec<Hash>) -> Result<()> {
        if self.is_set(index) {
            return Ok(());
        }
        let (start, end) = self.group_byte_range(index)?;
        let expected_len = (end - start) as usize;
        if bytes.len() != expected_len {
            return Err(Error::MalformedInput(format!(
                "group {index} expected {expected_len} bytes, got {}",
                bytes.len()
            )));
        }

        let orientations = path_orientations(self.content_len, self.group_len(), start);
        if orientations.len() != proof.len() {
            warn!(index, "proof length does not match tree depth");
            return Err(Error::VerificationFailed);
        }

        let chunk_counter = start / CHUNK_LEN as u64;
        let is_root = orientations.is_empty();
        let mut combined = hash_group_leaf_cv(bytes, chunk_counter, is_root);

        for level in (0..orientations.len()).rev() {
            let flags = if level == 0 { ROOT } else { 0 };
            let sibling_cv = bytes_to_cv(proof[level].as_bytes());
            combined = if orientations[level] {
                parent_cv(combined, sibling_cv, IV, flags)
            } else {
                parent_cv(sibling_cv, combined, IV, flags)
            };
        }

        if !ct_eq(&cv_to_bytes(combined), self.root_hash.as_bytes()) {
            warn!(index, "group proof failed verification");
            return Err(Error::VerificationFailed);
        }

        self.group_data.insert(index, bytes.to_vec());
        self.proof_nodes.insert(index, proof);
        self.set(index);
        debug!(index, "accepted proven group");
        Ok(())
    }

    /// Returns the proof stored for `index`, if that group is present.
    pub fn create_proof(&self, index: u64) -> Result<Vec<Hash>> {
        self.proof_nodes.get(&index).cloned().ok_or_else(|| {
            Error::InvalidRange(format!("no proof stored for group {index}"))
        })
    }

    pub fn missing_groups(&self) -> Vec<u64> {
        self.received
            .iter()
            .by_vals()
            .enumerate()
            .filter(|(_, bit)| !bit)
            .map(|(i, _)| i as u64)
            .collect()
    }

    pub fn present_groups(&self) -> Vec<u64> {
        self.received
            .iter()
            .by_vals()
            .enumerate()
            .filter(|(_, bit)| *bit)
            .map(|(i, _)| i as u64)
            .collect()
    }

    fn ranges_of(&self, present: bool) -> Vec<(u64, u64)> {
        let mut ranges = Vec::new();
        let mut current: Option<(u64, u64)> = None;
        for (i, bit) in self.received.iter().by_vals().enumerate() {
            let i = i as u64;
            if bit == present {
                match &mut current {
                    Some((_, end)) if *end == i => *end = i + 1,
                    _ => {
                        if let Some(range) = current.take() {
                            ranges.push(range);
                        }
                        current = Some((i, i + 1));
                    }
                }
            } else if let Some(range) = current.take() {
                ranges.push(range);
            }
        }
        if let Some(range) = current {
            ranges.push(range);
        }
        ranges
    }

    pub fn missing_ranges(&self) -> Vec<(u64, u64)> {
        self.ranges_of(false)
    }

    pub fn present_ranges(&self) -> Vec<(u64, u64)> {
        self.ranges_of(true)
    }

    pub fn progress(&self) -> f64 {
        if self.num_groups == 0 {
            return 1.0;
        }
        self.received.count_ones() as f64 / self.num_groups as f64
    }

    /// Concatenates present groups in order. If `require_complete` and any
    /// group is missing, fails with [`Error::Incomplete`]; otherwise
    /// missing groups are silently skipped, yielding a partial prefix view.
    pub fn finalize(&self, require_complete: bool) -> Result<Vec<u8>> {
        let have = self.received.count_ones() as u64;
        if require_complete && have < self.num_groups {
            return Err(Error::Incomplete {
                have,
                total: self.num_groups,
            });
        }
        let mut out = Vec::with_capacity(self.content_len as usize);
        for index in 0..self.num_groups {
            if let Some(bytes) = self.group_data.get(&index) {
                out.extend_from_slice(bytes);
            }
        }
        Ok(out)
    }

    pub fn export_state(&self) -> ExportedState {
        let mut groups = Vec::with_capacity(self.group_data.len());
        for (&index, bytes) in &self.group_data {
            groups.push(GroupRecord {
                index,
                bytes: bytes.clone(),
                proof: self.proof_nodes.get(&index).cloned().unwrap_or_default(),
            });
        }
        groups.sort_by_key(|g| g.index);

        ExportedState {
            root_hash: self.root_hash,
            content_len: self.content_len,
            chunk_group_log: self.chunk_group_log.get(),
            bitfield: self.received.clone().into_vec(),
            groups,
        }
    }

    pub fn import_state(state: ExportedState) -> Result<Self> {
        let chunk_group_log = ChunkGroupLog::new(state.chunk_group_log)?;
        let num_groups = count_groups(state.content_len, chunk_group_log);
        let expected_bitfield_bytes = num_groups.div_ceil(8) as usize;
        if state.bitfield.len() != expected_bitfield_bytes {
            return Err(Error::MalformedInput(format!(
                "bitfield is {} bytes, expected {expected_bitfield_bytes}",
                state.bitfield.len()
            )));
        }

        let mut receiver = PartialBao::new(state.root_hash, state.content_len, chunk_group_log);
        let mut bits: BitVec<u8, Lsb0> = BitVec::from_vec(state.bitfield);
        bits.truncate(num_groups as usize);

        for record in state.groups {
            let (start, end) = receiver.group_byte_range(record.index)?;
            let expected_len = (end - start) as usize;
            if record.bytes.len() != expected_len {
                return Err(Error::MalformedInput(format!(
                    "group {} expected {expected_len} bytes, got {}",
                    record.index,
                    record.bytes.len()
                )));
            }
            receiver.group_data.insert(record.index, record.bytes);
            receiver.proof_nodes.insert(record.index, record.proof);
        }
        receiver.received = bits;
        debug!(num_groups, "imported partial bao state");
        Ok(receiver)
    }
}

fn hash_group_leaf_cv(bytes: &[u8], chunk_counter: u64, is_root: bool) -> [u32; 8] {
    let mut scratch = Vec::new();
    super::tree::encode_into(bytes, chunk_counter, is_root, true, &mut scratch)
}

/// Walks the same recursive split the Iroh encoder uses and records, at
/// each level from the root down to the leaf group, whether the target
/// byte offset lies in the left (`true`) or right (`false`) subtree.
fn path_orientations(mut content_len: u64, group_len: u64, mut target_offset: u64) -> Vec<bool> {
    let mut out = Vec::new();
    while content_len > group_len {
        let split = left_len_with_unit(content_len, group_len);
        if target_offset < split {
            out.push(true);
            content_len = split;
        } else {
            out.push(false);
            target_offset -= split;
            content_len -= split;
        }
    }
    out
}

/// The wire-agnostic record exported by [`PartialBao::export_state`] and
/// consumed by [`PartialBao::import_state`]; round-trips through
/// `serde_json` (or any other `serde` format a caller prefers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedState {
    pub root_hash: Hash,
    pub content_len: u64,
    pub chunk_group_log: u8,
    pub bitfield: Vec<u8>,
    pub groups: Vec<GroupRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub index: u64,
    pub bytes: Vec<u8>,
    pub proof: Vec<Hash>,
}
