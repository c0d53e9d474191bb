//! An ordered collection of 32-byte digests with its own BLAKE3 digest.
//!
//! This is a minor value type (C8): a `Vec<Hash>` with convenience
//! operations and three stable serializations (bytes, hex, JSON).

use serde::{Deserialize, Serialize};

use crate::blake3::hasher::{hash, Hash};
use crate::error::{Error, Result};

/// A mutable, ordered sequence of 32-byte BLAKE3 digests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashSequence {
    hashes: Vec<Hash>,
}

impl HashSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hashes(hashes: Vec<Hash>) -> Self {
        Self { hashes }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn add(&mut self, hash: Hash) {
        self.hashes.push(hash);
    }

    pub fn insert_at(&mut self, index: usize, hash: Hash) -> Result<()> {
        if index > self.hashes.len() {
            return Err(Error::InvalidRange(format!(
                "insert index {index} out of bounds for sequence of length {}",
                self.hashes.len()
            )));
        }
        self.hashes.insert(index, hash);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Hash> {
        if index >= self.hashes.len() {
            return Err(Error::InvalidRange(format!(
                "remove index {index} out of bounds for sequence of length {}",
                self.hashes.len()
            )));
        }
        Ok(self.hashes.remove(index))
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    pub fn slice(&self, start: usize, end: usize) -> Result<HashSequence> {
        if start > end || end > self.hashes.len() {
            return Err(Error::InvalidRange(format!(
                "slice [{start}, {end}) out of bounds for sequence of length {}",
                self.hashes.len()
            )));
        }
        Ok(HashSequence::from_hashes(self.hashes[start..end].to_vec()))
    }

    pub fn concat(&self, other: &HashSequence) -> HashSequence {
        let mut hashes = self.hashes.clone();
        hashes.extend(other.hashes.iter().copied());
        HashSequence::from_hashes(hashes)
    }

    pub fn equals(&self, other: &HashSequence) -> bool {
        self == other
    }

    pub fn index_of(&self, needle: &Hash) -> Option<usize> {
        self.hashes.iter().position(|h| h == needle)
    }

    pub fn has(&self, needle: &Hash) -> bool {
        self.index_of(needle).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hash> {
        self.hashes.iter()
    }

    /// BLAKE3 over the concatenated digest bytes.
    pub fn finalize(&self) -> Hash {
        let mut buf = Vec::with_capacity(self.hashes.len() * 32);
        for h in &self.hashes {
            buf.extend_from_slice(h.as_bytes());
        }
        hash(&buf)
    }

    /// `[len: u32 LE][len * 32 bytes]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.hashes.len() * 32);
        out.extend_from_slice(&(self.hashes.len() as u32).to_le_bytes());
        for h in &self.hashes {
            out.extend_from_slice(h.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::MalformedInput(
                "hash sequence shorter than the 4-byte count header".into(),
            ));
        }
        let mut count_bytes = [0u8; 4];
        count_bytes.copy_from_slice(&bytes[..4]);
        let count = u32::from_le_bytes(count_bytes) as usize;
        let rest = &bytes[4..];
        if rest.len() != count * 32 {
            return Err(Error::MalformedInput(format!(
                "hash sequence declares {count} digests but has {} trailing bytes",
                rest.len()
            )));
        }
        let mut hashes = Vec::with_capacity(count);
        for chunk in rest.chunks_exact(32) {
            hashes.push(Hash::from_bytes(chunk)?);
        }
        Ok(Self { hashes })
    }

    /// One hex string per digest, joined by newlines.
    pub fn to_hex_lines(&self) -> String {
        self.hashes
            .iter()
            .map(Hash::to_hex)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_hex_vec(&self) -> Vec<String> {
        self.hashes.iter().map(Hash::to_hex).collect()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&HashSequenceJson {
            hashes: self.to_hex_vec(),
        })
        .expect("hex strings always serialize")
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let parsed: HashSequenceJson = serde_json::from_str(s)
            .map_err(|e| Error::MalformedInput(format!("invalid hash sequence json: {e}")))?;
        let hashes = parsed
            .hashes
            .iter()
            .map(|h| Hash::from_hex(h))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { hashes })
    }
}

impl<'a> IntoIterator for &'a HashSequence {
    type Item = &'a Hash;
    type IntoIter = std::slice::Iter<'a, Hash>;

    fn into_iter(self) -> Self::IntoIter {
        self.hashes.iter()
    }
}

#[derive(Serialize, Deserialize)]
struct HashSequenceJson {
    hashes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blake3::hasher::hash;

    fn seq(n: usize) -> HashSequence {
        let hashes = (0..n as u8).map(|i| hash(&[i])).collect();
        HashSequence::from_hashes(hashes)
    }

    #[test]
    fn add_and_has() {
        let mut s = HashSequence::new();
        let h = hash(b"one");
        s.add(h);
        assert!(s.has(&h));
        assert_eq!(s.index_of(&h), Some(0));
    }

    #[test]
    fn insert_remove_clear() {
        let mut s = seq(3);
        let h = hash(b"inserted");
        s.insert_at(1, h).unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s.remove_at(1).unwrap(), h);
        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn slice_and_concat_round_trip() {
        let s = seq(5);
        let left = s.slice(0, 2).unwrap();
        let right = s.slice(2, 5).unwrap();
        assert_eq!(left.concat(&right), s);
    }

    #[test]
    fn out_of_bounds_operations_error() {
        let s = seq(2);
        assert!(s.slice(0, 3).is_err());
        assert!(s.slice(2, 1).is_err());
    }

    #[test]
    fn bytes_round_trip() {
        let s = seq(4);
        let bytes = s.to_bytes();
        assert_eq!(bytes.len(), 4 + 4 * 32);
        assert_eq!(HashSequence::from_bytes(&bytes).unwrap(), s);
    }

    #[test]
    fn json_round_trip() {
        let s = seq(3);
        let json = s.to_json();
        assert_eq!(HashSequence::from_json(&json).unwrap(), s);
    }

    #[test]
    fn finalize_is_blake3_of_concatenated_digests() {
        let s = seq(2);
        let mut concatenated = Vec::new();
        for h in &s {
            concatenated.extend_from_slice(h.as_bytes());
        }
        assert_eq!(s.finalize(), hash(&concatenated));
    }
}
