//! Rota Basic Types
//!
//! Naming conventions:
//! - `_id` suffix: Identifiers
//! - `_units` suffix: Whole holding units
//! - `_amount` suffix: Asset base units

use serde::{Deserialize, Serialize};

/// Asset quantity in base units
pub type Amount = u128;

/// Ordinal cycle of a reward asset (1-based)
pub type Cycle = u32;

/// Day number under the configured cutover convention
pub type DayIndex = u64;

// ============================================================
// Identifiers (newtype pattern, non-interchangeable)
// ============================================================

/// Asset identifier (address or handle)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Participant (account) identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Three-part ledger key: (reward asset, participant, cycle)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumptionKey {
    pub asset: AssetId,
    pub participant: ParticipantId,
    pub cycle: Cycle,
}

impl ConsumptionKey {
    pub fn new(asset: AssetId, participant: ParticipantId, cycle: Cycle) -> Self {
        Self {
            asset,
            participant,
            cycle,
        }
    }
}

impl std::fmt::Display for ConsumptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.asset, self.participant, self.cycle)
    }
}

/// Truncate a raw credential balance to whole holding units.
///
/// The credential is minted upstream in whole units only, so truncation
/// never discards a real fraction. A zero `unit_base` yields zero units.
pub fn whole_units(raw: Amount, unit_base: Amount) -> u64 {
    if unit_base == 0 {
        return 0;
    }
    u64::try_from(raw / unit_base).unwrap_or(u64::MAX)
}

// ============================================================
// Receipt Digest
// ============================================================

/// Receipt digest (32 bytes, BLAKE3)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptDigest(pub [u8; 32]);

impl ReceiptDigest {
    /// BLAKE3 hash
    pub fn blake3(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl std::fmt::Debug for ReceiptDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReceiptDigest({}...)", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for ReceiptDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Domain-separated canonical encoder for receipt digests
pub(crate) struct CanonicalWriter {
    data: Vec<u8>,
}

impl CanonicalWriter {
    pub(crate) fn new(domain: &[u8]) -> Self {
        let mut data = Vec::with_capacity(128);
        data.extend_from_slice(domain);
        data.push(0);
        Self { data }
    }

    pub(crate) fn str(mut self, s: &str) -> Self {
        self.data.extend_from_slice(&(s.len() as u32).to_be_bytes());
        self.data.extend_from_slice(s.as_bytes());
        self
    }

    pub(crate) fn u64(mut self, v: u64) -> Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub(crate) fn u128(mut self, v: u128) -> Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub(crate) fn i64(mut self, v: i64) -> Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub(crate) fn finish(self) -> ReceiptDigest {
        ReceiptDigest::blake3(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_units_truncates() {
        let base = 1_000_000_000_000_000_000u128;
        assert_eq!(whole_units(3 * base, base), 3);
        assert_eq!(whole_units(3 * base + base / 2, base), 3);
        assert_eq!(whole_units(base - 1, base), 0);
        assert_eq!(whole_units(5, 0), 0);
    }

    #[test]
    fn test_consumption_key_display() {
        let key = ConsumptionKey::new(AssetId::new("asset:a"), ParticipantId::new("p:1"), 4);
        assert_eq!(key.to_string(), "asset:a/p:1/4");
    }

    #[test]
    fn test_canonical_writer_is_deterministic() {
        let a = CanonicalWriter::new(b"rota:test:v1").str("x").u64(7).finish();
        let b = CanonicalWriter::new(b"rota:test:v1").str("x").u64(7).finish();
        let c = CanonicalWriter::new(b"rota:test:v1").str("x").u64(8).finish();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        let a = CanonicalWriter::new(b"d").str("ab").str("c").finish();
        let b = CanonicalWriter::new(b"d").str("a").str("bc").finish();
        assert_ne!(a, b);
    }
}
