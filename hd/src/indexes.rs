// Wallet-level libraries for bitcoin protocol by LNP/BP Association
//
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// This software is distributed without any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

use std::cmp::Ordering;
use std::str::FromStr;

use bitcoin::util::bip32::{self, ChildNumber};

/// Boundary between unhardened and hardened derivation indexes, per BIP-32.
pub const HARDENED_INDEX_BOUNDARY: u32 = 1 << 31;

/// Common API for a single derivation path segment, implemented for both
/// the raw BIP-32 [`ChildNumber`] and the range-checked wrapper types below.
pub trait SegmentIndexes
where
    Self: Sized + Eq + Ord + Clone,
{
    /// Constructs derivation path segment with index equal to zero.
    fn zero() -> Self;

    /// Detects whether path segment uses a hardened index.
    fn is_hardened(&self) -> bool;

    /// Constructs a segment from an index known to already be in the
    /// `0..HARDENED_INDEX_BOUNDARY` range for unhardened, or the full u32
    /// range (with the boundary bit set) for hardened derivation values.
    fn from_derivation_value(value: u32) -> Result<Self, bip32::Error>;

    /// Returns the raw derivation value, with the hardened bit set if
    /// applicable — this is exactly the 32-bit value serialized on the wire.
    fn to_derivation_value(&self) -> u32;
}

impl SegmentIndexes for ChildNumber {
    #[inline]
    fn zero() -> Self { ChildNumber::Normal { index: 0 } }

    #[inline]
    fn is_hardened(&self) -> bool { !self.is_normal() }

    #[inline]
    fn from_derivation_value(value: u32) -> Result<Self, bip32::Error> {
        Ok(ChildNumber::from(value))
    }

    #[inline]
    fn to_derivation_value(&self) -> u32 { (*self).into() }
}

/// Index for unhardened children derivation; ensures that the inner value
/// is always `< HARDENED_INDEX_BOUNDARY`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Default, Display, From)]
#[display(inner)]
pub struct UnhardenedIndex(
    #[from(u8)]
    #[from(u16)]
    u32,
);

impl PartialEq<u32> for UnhardenedIndex {
    fn eq(&self, other: &u32) -> bool { self.0 == *other }
}

impl PartialOrd<u32> for UnhardenedIndex {
    fn partial_cmp(&self, other: &u32) -> Option<Ordering> { self.0.partial_cmp(other) }
}

impl UnhardenedIndex {
    /// Constructs an unhardened index, failing if `index` is already in the
    /// hardened range.
    pub fn from_index(index: u32) -> Result<Self, bip32::Error> {
        if index >= HARDENED_INDEX_BOUNDARY {
            Err(bip32::Error::InvalidChildNumber(index))
        } else {
            Ok(Self(index))
        }
    }

    /// Returns the plain (zero-based, un-offset) index value.
    #[inline]
    pub fn index(&self) -> u32 { self.0 }
}

impl SegmentIndexes for UnhardenedIndex {
    #[inline]
    fn zero() -> Self { UnhardenedIndex(0) }

    #[inline]
    fn is_hardened(&self) -> bool { false }

    #[inline]
    fn from_derivation_value(value: u32) -> Result<Self, bip32::Error> { Self::from_index(value) }

    #[inline]
    fn to_derivation_value(&self) -> u32 { self.0 }
}

impl FromStr for UnhardenedIndex {
    type Err = bip32::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnhardenedIndex::from_index(u32::from_str(s).map_err(|_| bip32::Error::InvalidChildNumberFormat)?)
    }
}

impl From<UnhardenedIndex> for ChildNumber {
    fn from(idx: UnhardenedIndex) -> Self { ChildNumber::Normal { index: idx.0 } }
}

impl TryFrom<ChildNumber> for UnhardenedIndex {
    type Error = HardenedIndexExpected;

    fn try_from(value: ChildNumber) -> Result<Self, Self::Error> {
        match value {
            ChildNumber::Normal { index } => Ok(UnhardenedIndex(index)),
            ChildNumber::Hardened { index } => Err(HardenedIndexExpected(HardenedIndex(index))),
        }
    }
}

/// Index for hardened children derivation; the inner value is the zero-based
/// (i.e. already offset by [`HARDENED_INDEX_BOUNDARY`]) index.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default, Display, From)]
#[display("{0}h", alt = "{0}'")]
pub struct HardenedIndex(
    #[from(u8)]
    #[from(u16)]
    pub(crate) u32,
);

impl HardenedIndex {
    /// Constructs a hardened index from a zero-based value.
    pub fn from_index(index: u32) -> Result<Self, bip32::Error> {
        if index >= HARDENED_INDEX_BOUNDARY {
            Err(bip32::Error::InvalidChildNumber(index))
        } else {
            Ok(Self(index))
        }
    }

    /// Returns the zero-based index value.
    #[inline]
    pub fn index(&self) -> u32 { self.0 }
}

impl SegmentIndexes for HardenedIndex {
    #[inline]
    fn zero() -> Self { HardenedIndex(0) }

    #[inline]
    fn is_hardened(&self) -> bool { true }

    #[inline]
    fn from_derivation_value(value: u32) -> Result<Self, bip32::Error> {
        if value < HARDENED_INDEX_BOUNDARY {
            return Err(bip32::Error::InvalidChildNumber(value));
        }
        Ok(Self(value - HARDENED_INDEX_BOUNDARY))
    }

    #[inline]
    fn to_derivation_value(&self) -> u32 { self.0 + HARDENED_INDEX_BOUNDARY }
}

impl From<HardenedIndex> for ChildNumber {
    fn from(index: HardenedIndex) -> Self { ChildNumber::Hardened { index: index.0 } }
}

impl TryFrom<ChildNumber> for HardenedIndex {
    type Error = UnhardenedIndexExpected;

    fn try_from(value: ChildNumber) -> Result<Self, Self::Error> {
        match value {
            ChildNumber::Hardened { index } => Ok(HardenedIndex(index)),
            ChildNumber::Normal { index } => Err(UnhardenedIndexExpected(UnhardenedIndex(index))),
        }
    }
}

/// normal (unhardened) derivation index {0} met when a hardened index was
/// expected.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Display, Error, From)]
#[display(doc_comments)]
pub struct UnhardenedIndexExpected(pub UnhardenedIndex);

/// hardened derivation index {0} met when a normal (unhardened) index was
/// expected.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Display, Error, From)]
#[display(doc_comments)]
pub struct HardenedIndexExpected(pub HardenedIndex);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unhardened_rejects_hardened_range() {
        assert!(UnhardenedIndex::from_index(HARDENED_INDEX_BOUNDARY).is_err());
        assert!(UnhardenedIndex::from_index(0).is_ok());
    }

    #[test]
    fn hardened_roundtrips_derivation_value() {
        let h = HardenedIndex::from_index(5).unwrap();
        assert_eq!(h.to_derivation_value(), HARDENED_INDEX_BOUNDARY + 5);
        assert_eq!(HardenedIndex::from_derivation_value(h.to_derivation_value()).unwrap(), h);
    }

    #[test]
    fn hardened_display_uses_h_suffix() {
        let h = HardenedIndex::from_index(44).unwrap();
        assert_eq!(h.to_string(), "44h");
        assert_eq!(format!("{:#}", h), "44'");
    }
}
