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

use bitcoin::consensus::{deserialize, serialize};
use bitcoin::Transaction;
use bitcoin_hd::KeyOriginInfo;

use crate::errors::Error;
use crate::keypath;
use crate::map::{expect_len, read_key, SeenKeys};
use crate::varint::{deser_string, ser_string, CompactSizeMode, Cursor};

pub const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;
pub const PSBT_GLOBAL_XPUB: u8 = 0x01;

/// The PSBT global map (spec.md §3 `GlobalMap`, §4.4).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct GlobalMap {
    pub unsigned_tx: Transaction,
    /// serialized extended public key (78 bytes) -> its key-origin info.
    pub xpubs: BTreeMap<Vec<u8>, KeyOriginInfo>,
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl GlobalMap {
    pub(crate) fn decode(
        cur: &mut Cursor,
        mode: CompactSizeMode,
        max_size: usize,
    ) -> Result<Self, Error> {
        let mut unsigned_tx = None;
        let mut xpubs = BTreeMap::new();
        let mut unknown = BTreeMap::new();
        let mut seen = SeenKeys::new();
        while let Some((key_type, key_suffix, full_key)) = read_key(cur, mode, max_size)? {
            seen.check(key_type, full_key.clone())?;
            let value = deser_string(cur, mode, max_size)?;
            match key_type {
                PSBT_GLOBAL_UNSIGNED_TX => {
                    expect_len(key_type, &key_suffix, 0)?;
                    let tx: Transaction = deserialize(&value)?;
                    for txin in &tx.input {
                        if !txin.script_sig.is_empty() || !txin.witness.is_empty() {
                            return Err(Error::CrossCheckFailed(
                                "unsigned_tx input carries scriptSig or witness data",
                            ));
                        }
                    }
                    unsigned_tx = Some(tx);
                }
                PSBT_GLOBAL_XPUB => {
                    if key_suffix.len() != 78 {
                        return Err(Error::bad_length(key_type));
                    }
                    xpubs.insert(key_suffix, keypath::deserialize(&value)?);
                }
                _ => {
                    unknown.insert(full_key, value);
                }
            }
        }
        let unsigned_tx = unsigned_tx.ok_or(Error::CrossCheckFailed("missing PSBT_GLOBAL_UNSIGNED_TX"))?;
        Ok(GlobalMap { unsigned_tx, xpubs, unknown })
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        emit(out, PSBT_GLOBAL_UNSIGNED_TX, &[], &serialize(&self.unsigned_tx));
        for (xpub, origin) in &self.xpubs {
            emit(out, PSBT_GLOBAL_XPUB, xpub, &keypath::serialize(origin));
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
    use bitcoin::{PackedLockTime, Transaction};

    fn empty_tx() -> Transaction {
        Transaction {
            version: 2,
            lock_time: PackedLockTime::ZERO,
            input: vec![],
            output: vec![],
        }
    }

    #[test]
    fn global_map_roundtrips() {
        let map = GlobalMap {
            unsigned_tx: empty_tx(),
            xpubs: BTreeMap::new(),
            unknown: BTreeMap::new(),
        };
        let mut bytes = Vec::new();
        map.encode(&mut bytes);
        let mut cur = Cursor::new(&bytes);
        let decoded = GlobalMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn missing_unsigned_tx_rejected() {
        let bytes = ser_string(&[]);
        let mut cur = Cursor::new(&bytes);
        let err = GlobalMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap_err();
        assert!(matches!(err, Error::CrossCheckFailed(_)));
    }

    #[test]
    fn bad_xpub_length_rejected() {
        let mut bytes = Vec::new();
        let mut key = vec![PSBT_GLOBAL_UNSIGNED_TX];
        key.extend_from_slice(&[]);
        bytes.extend(ser_string(&key));
        bytes.extend(ser_string(&serialize(&empty_tx())));
        let mut bad_key = vec![PSBT_GLOBAL_XPUB];
        bad_key.extend_from_slice(&[0u8; 10]);
        bytes.extend(ser_string(&bad_key));
        bytes.extend(ser_string(&[0u8; 4]));
        bytes.extend(ser_string(&[]));
        let mut cur = Cursor::new(&bytes);
        let err = GlobalMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap_err();
        assert!(matches!(err, Error::BadLength(PSBT_GLOBAL_XPUB)));
    }
}
