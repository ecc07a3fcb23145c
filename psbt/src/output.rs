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

use std::collections::BTreeMap;

use bitcoin::Script;
use bitcoin_hd::KeyOriginInfo;

use crate::errors::Error;
use crate::keypath;
use crate::map::{expect_len, read_key, SeenKeys};
use crate::varint::{deser_string, ser_string, CompactSizeMode, Cursor};

pub const PSBT_OUT_REDEEM_SCRIPT: u8 = 0x00;
pub const PSBT_OUT_WITNESS_SCRIPT: u8 = 0x01;
pub const PSBT_OUT_BIP32_DERIVATION: u8 = 0x02;
pub const PSBT_OUT_TAP_INTERNAL_KEY: u8 = 0x05;
pub const PSBT_OUT_TAP_TREE: u8 = 0x06;
pub const PSBT_OUT_TAP_BIP32_DERIVATION: u8 = 0x07;

/// One PSBT output's key-value map (spec.md §3 `OutputMap`, §4.6 ordering).
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct OutputMap {
    pub redeem_script: Option<Script>,
    pub witness_script: Option<Script>,
    /// pubkey bytes (33 or 65) -> key-origin info.
    pub hd_keypaths: BTreeMap<Vec<u8>, KeyOriginInfo>,
    pub tap_internal_key: Option<[u8; 32]>,
    /// raw Taproot script-tree encoding (BIP-371); opaque to this codec.
    pub tap_tree: Option<Vec<u8>>,
    /// x-only pubkey -> (leaf hashes it appears under, key-origin info).
    pub tap_key_origins: BTreeMap<Vec<u8>, (Vec<[u8; 32]>, KeyOriginInfo)>,
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl OutputMap {
    pub(crate) fn decode(
        cur: &mut Cursor,
        mode: CompactSizeMode,
        max_size: usize,
    ) -> Result<Self, Error> {
        let mut map = OutputMap::default();
        let mut seen = SeenKeys::new();
        while let Some((key_type, key_suffix, full_key)) = read_key(cur, mode, max_size)? {
            seen.check(key_type, full_key.clone())?;
            let value = deser_string(cur, mode, max_size)?;
            match key_type {
                PSBT_OUT_REDEEM_SCRIPT => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.redeem_script = Some(Script::from(value));
                }
                PSBT_OUT_WITNESS_SCRIPT => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.witness_script = Some(Script::from(value));
                }
                PSBT_OUT_BIP32_DERIVATION => {
                    if key_suffix.len() != 33 && key_suffix.len() != 65 {
                        return Err(Error::bad_length(key_type));
                    }
                    map.hd_keypaths.insert(key_suffix, keypath::deserialize(&value)?);
                }
                PSBT_OUT_TAP_INTERNAL_KEY => {
                    expect_len(key_type, &key_suffix, 0)?;
                    expect_len(key_type, &value, 32)?;
                    let mut buf = [0u8; 32];
                    buf.copy_from_slice(&value);
                    map.tap_internal_key = Some(buf);
                }
                PSBT_OUT_TAP_TREE => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.tap_tree = Some(value);
                }
                PSBT_OUT_TAP_BIP32_DERIVATION => {
                    expect_len(key_type, &key_suffix, 32)?;
                    let (leaf_hashes, origin) = keypath::deserialize_tap(&value)?;
                    map.tap_key_origins.insert(key_suffix, (leaf_hashes, origin));
                }
                _ => {
                    map.unknown.insert(full_key, value);
                }
            }
        }
        Ok(map)
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        if let Some(script) = &self.redeem_script {
            if !script.is_empty() {
                emit(out, PSBT_OUT_REDEEM_SCRIPT, &[], script.as_bytes());
            }
        }
        if let Some(script) = &self.witness_script {
            if !script.is_empty() {
                emit(out, PSBT_OUT_WITNESS_SCRIPT, &[], script.as_bytes());
            }
        }
        for (pk, origin) in &self.hd_keypaths {
            emit(out, PSBT_OUT_BIP32_DERIVATION, pk, &keypath::serialize(origin));
        }
        if let Some(key) = &self.tap_internal_key {
            emit(out, PSBT_OUT_TAP_INTERNAL_KEY, &[], key);
        }
        if let Some(tree) = &self.tap_tree {
            emit(out, PSBT_OUT_TAP_TREE, &[], tree);
        }
        for (xonly, (leaf_hashes, origin)) in &self.tap_key_origins {
            emit(
                out,
                PSBT_OUT_TAP_BIP32_DERIVATION,
                xonly,
                &keypath::serialize_tap(leaf_hashes, origin),
            );
        }
        for (key, value) in &self.unknown {
            out.extend(ser_string(key));
            out.extend(ser_string(value));
        }
        out.extend(ser_string(&[]));
    }
}

fn emit(out: &mut Vec<u8>, key_type: u8, key_suffix: &[u8], value: &[u8]) {
    let mut key = vec![key_type];
    key.extend_from_slice(key_suffix);
    out.extend(ser_string(&key));
    out.extend(ser_string(value));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::varint::DEFAULT_MAX_SIZE;

    #[test]
    fn output_map_roundtrips() {
        let mut map = OutputMap::default();
        map.redeem_script = Some(Script::from(vec![0x51]));
        map.tap_tree = Some(vec![0x01, 0xc0, 0x51]);
        let mut bytes = Vec::new();
        map.encode(&mut bytes);
        let mut cur = Cursor::new(&bytes);
        let decoded = OutputMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn bad_bip32_pubkey_length_rejected() {
        let mut bytes = Vec::new();
        let mut key = vec![PSBT_OUT_BIP32_DERIVATION];
        key.extend_from_slice(&[0u8; 10]);
        bytes.extend(ser_string(&key));
        bytes.extend(ser_string(&[0u8; 4]));
        bytes.extend(ser_string(&[]));
        let mut cur = Cursor::new(&bytes);
        let err = OutputMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap_err();
        assert!(matches!(err, Error::BadLength(PSBT_OUT_BIP32_DERIVATION)));
    }
}
