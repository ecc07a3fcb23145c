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

//! `DeserializeHDKeypath`/`SerializeHDKeypath`: the one key-origin-info
//! wire shape shared by `PSBT_GLOBAL_XPUB`, `PSBT_IN_BIP32_DERIVATION` and
//! `PSBT_OUT_BIP32_DERIVATION` (spec.md §3 `KeyOriginInfo`), factored out
//! once and reused by the global/input/output maps — mirroring how
//! hwilib's `psbt.py` shares a single free function across all three
//! instead of duplicating the fingerprint+path codec per map kind.

use bitcoin_hd::KeyOriginInfo;

use crate::errors::Error;

/// Parses a `PSBT_*_BIP32_DERIVATION`/`PSBT_GLOBAL_XPUB` value: 4-byte
/// fingerprint followed by zero or more little-endian `u32` path steps.
pub fn deserialize(value: &[u8]) -> Result<KeyOriginInfo, Error> {
    KeyOriginInfo::from_bytes(value).map_err(|_| Error::BadLength(0))
}

/// Serializes a [`KeyOriginInfo`] back to its PSBT wire form.
pub fn serialize(origin: &KeyOriginInfo) -> Vec<u8> { origin.to_bytes() }

/// Taproot's variant of the same shape (`PSBT_IN_TAP_BIP32_DERIVATION`):
/// a varint count of 32-byte leaf hashes, each in turn, then the ordinary
/// key-origin-info bytes.
pub fn deserialize_tap(value: &[u8]) -> Result<(Vec<[u8; 32]>, KeyOriginInfo), Error> {
    use crate::varint::{read_varint, CompactSizeMode, Cursor};

    let mut cur = Cursor::new(value);
    let n = read_varint(&mut cur, CompactSizeMode::Minimal)? as usize;
    let mut leaf_hashes = Vec::with_capacity(n);
    for _ in 0..n {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(cur.read_slice(32)?);
        leaf_hashes.push(hash);
    }
    let rest = cur.read_slice(cur.remaining())?;
    let origin = deserialize(rest)?;
    Ok((leaf_hashes, origin))
}

/// Inverse of [`deserialize_tap`].
pub fn serialize_tap(leaf_hashes: &[[u8; 32]], origin: &KeyOriginInfo) -> Vec<u8> {
    use crate::varint::ser_compact_size;

    let mut out = ser_compact_size(leaf_hashes.len() as u64);
    for hash in leaf_hashes {
        out.extend_from_slice(hash);
    }
    out.extend_from_slice(&serialize(origin));
    out
}
