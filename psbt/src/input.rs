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

use std::collections::{BTreeMap, BTreeSet};

use bitcoin::consensus::{deserialize, serialize};
use bitcoin::{Script, Transaction, TxOut, Witness};
use bitcoin_hd::KeyOriginInfo;

use crate::errors::Error;
use crate::keypath;
use crate::map::{expect_len, read_key, SeenKeys};
use crate::varint::{deser_string, ser_string, CompactSizeMode, Cursor, DEFAULT_MAX_SIZE};

pub const PSBT_IN_NON_WITNESS_UTXO: u8 = 0x00;
pub const PSBT_IN_WITNESS_UTXO: u8 = 0x01;
pub const PSBT_IN_PARTIAL_SIG: u8 = 0x02;
pub const PSBT_IN_SIGHASH_TYPE: u8 = 0x03;
pub const PSBT_IN_REDEEM_SCRIPT: u8 = 0x04;
pub const PSBT_IN_WITNESS_SCRIPT: u8 = 0x05;
pub const PSBT_IN_BIP32_DERIVATION: u8 = 0x06;
pub const PSBT_IN_FINAL_SCRIPTSIG: u8 = 0x07;
pub const PSBT_IN_FINAL_SCRIPTWITNESS: u8 = 0x08;
pub const PSBT_IN_TAP_KEY_SIG: u8 = 0x13;
pub const PSBT_IN_TAP_SCRIPT_SIG: u8 = 0x14;
pub const PSBT_IN_TAP_LEAF_SCRIPT: u8 = 0x15;
pub const PSBT_IN_TAP_BIP32_DERIVATION: u8 = 0x16;
pub const PSBT_IN_TAP_INTERNAL_KEY: u8 = 0x17;
pub const PSBT_IN_TAP_MERKLE_ROOT: u8 = 0x18;

/// A script-plus-leaf-version pair at a Taproot tree leaf, keyed by every
/// control block that proves its membership (spec.md §3 `PSBT_IN_TAP_LEAF_SCRIPT`).
pub type TapScriptKey = (Script, u8);

/// One PSBT input's key-value map (spec.md §3 `InputMap`, §4.5 ordering).
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct InputMap {
    pub non_witness_utxo: Option<Transaction>,
    pub witness_utxo: Option<TxOut>,
    /// pubkey bytes (33 or 65) -> signature bytes.
    pub partial_sigs: BTreeMap<Vec<u8>, Vec<u8>>,
    pub sighash: Option<u32>,
    pub redeem_script: Option<Script>,
    pub witness_script: Option<Script>,
    /// pubkey bytes (33 or 65) -> key-origin info.
    pub hd_keypaths: BTreeMap<Vec<u8>, KeyOriginInfo>,
    pub final_script_sig: Option<Script>,
    pub final_script_witness: Option<Witness>,
    pub tap_key_sig: Option<Vec<u8>>,
    /// (x-only pubkey, leaf hash) -> signature bytes.
    pub tap_script_sigs: BTreeMap<(Vec<u8>, [u8; 32]), Vec<u8>>,
    /// (leaf script, leaf version) -> set of control blocks proving it.
    pub tap_scripts: BTreeMap<TapScriptKey, BTreeSet<Vec<u8>>>,
    /// x-only pubkey -> (leaf hashes it signs for, key-origin info).
    pub tap_key_origins: BTreeMap<Vec<u8>, (Vec<[u8; 32]>, KeyOriginInfo)>,
    pub tap_internal_key: Option<[u8; 32]>,
    pub tap_merkle_root: Option<[u8; 32]>,
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InputMap {
    /// An input is finalized once it carries a non-empty `final_script_sig`
    /// and/or a non-null `final_script_witness` (spec.md §4.5).
    pub fn is_finalized(&self) -> bool {
        self.final_script_sig.as_ref().map_or(false, |s| !s.is_empty())
            || self.final_script_witness.as_ref().map_or(false, |w| !w.is_empty())
    }

    pub(crate) fn decode(
        cur: &mut Cursor,
        mode: CompactSizeMode,
        max_size: usize,
    ) -> Result<Self, Error> {
        let mut map = InputMap::default();
        let mut seen = SeenKeys::new();
        while let Some((key_type, key_suffix, full_key)) = read_key(cur, mode, max_size)? {
            seen.check(key_type, full_key.clone())?;
            let value = deser_string(cur, mode, max_size)?;
            match key_type {
                PSBT_IN_NON_WITNESS_UTXO => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.non_witness_utxo = Some(deserialize(&value)?);
                }
                PSBT_IN_WITNESS_UTXO => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.witness_utxo = Some(deserialize(&value)?);
                }
                PSBT_IN_PARTIAL_SIG => {
                    expect_pubkey_len(key_type, &key_suffix)?;
                    map.partial_sigs.insert(key_suffix, value);
                }
                PSBT_IN_SIGHASH_TYPE => {
                    expect_len(key_type, &key_suffix, 0)?;
                    expect_len(key_type, &value, 4)?;
                    map.sighash = Some(u32::from_le_bytes([value[0], value[1], value[2], value[3]]));
                }
                PSBT_IN_REDEEM_SCRIPT => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.redeem_script = Some(Script::from(value));
                }
                PSBT_IN_WITNESS_SCRIPT => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.witness_script = Some(Script::from(value));
                }
                PSBT_IN_BIP32_DERIVATION => {
                    expect_pubkey_len(key_type, &key_suffix)?;
                    map.hd_keypaths.insert(key_suffix, keypath::deserialize(&value)?);
                }
                PSBT_IN_FINAL_SCRIPTSIG => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.final_script_sig = Some(Script::from(value));
                }
                PSBT_IN_FINAL_SCRIPTWITNESS => {
                    expect_len(key_type, &key_suffix, 0)?;
                    map.final_script_witness = Some(deserialize(&value)?);
                }
                PSBT_IN_TAP_KEY_SIG => {
                    expect_len(key_type, &key_suffix, 0)?;
                    expect_sig_len(key_type, &value)?;
                    map.tap_key_sig = Some(value);
                }
                PSBT_IN_TAP_SCRIPT_SIG => {
                    if key_suffix.len() != 64 {
                        return Err(Error::bad_length(key_type));
                    }
                    expect_sig_len(key_type, &value)?;
                    let xonly = key_suffix[..32].to_vec();
                    let mut leaf_hash = [0u8; 32];
                    leaf_hash.copy_from_slice(&key_suffix[32..]);
                    map.tap_script_sigs.insert((xonly, leaf_hash), value);
                }
                PSBT_IN_TAP_LEAF_SCRIPT => {
                    if key_suffix.is_empty() || (key_suffix.len() - 1) % 32 != 0 || key_suffix.len() < 33 {
                        return Err(Error::bad_length(key_type));
                    }
                    if value.is_empty() {
                        return Err(Error::bad_length(key_type));
                    }
                    let leaf_ver = value[value.len() - 1];
                    let script = Script::from(value[..value.len() - 1].to_vec());
                    map.tap_scripts.entry((script, leaf_ver)).or_default().insert(key_suffix);
                }
                PSBT_IN_TAP_BIP32_DERIVATION => {
                    expect_len(key_type, &key_suffix, 32)?;
                    let (leaf_hashes, origin) = keypath::deserialize_tap(&value)?;
                    map.tap_key_origins.insert(key_suffix, (leaf_hashes, origin));
                }
                PSBT_IN_TAP_INTERNAL_KEY => {
                    expect_len(key_type, &key_suffix, 0)?;
                    expect_len(key_type, &value, 32)?;
                    let mut buf = [0u8; 32];
                    buf.copy_from_slice(&value);
                    map.tap_internal_key = Some(buf);
                }
                PSBT_IN_TAP_MERKLE_ROOT => {
                    expect_len(key_type, &key_suffix, 0)?;
                    expect_len(key_type, &value, 32)?;
                    let mut buf = [0u8; 32];
                    buf.copy_from_slice(&value);
                    map.tap_merkle_root = Some(buf);
                }
                _ => {
                    map.unknown.insert(full_key, value);
                }
            }
        }
        Ok(map)
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        if self.is_finalized() {
            self.encode_finalized(out);
        } else {
            self.encode_unfinalized(out);
        }
        for (key, value) in &self.unknown {
            out.extend(ser_string(key));
            out.extend(ser_string(value));
        }
        out.extend(ser_string(&[]));
    }

    fn encode_unfinalized(&self, out: &mut Vec<u8>) {
        if let Some(tx) = &self.non_witness_utxo {
            emit(out, PSBT_IN_NON_WITNESS_UTXO, &[], &serialize(tx));
        }
        if let Some(txout) = &self.witness_utxo {
            emit(out, PSBT_IN_WITNESS_UTXO, &[], &serialize(txout));
        }
        for (pk, sig) in &self.partial_sigs {
            emit(out, PSBT_IN_PARTIAL_SIG, pk, sig);
        }
        if let Some(sighash) = self.sighash {
            emit(out, PSBT_IN_SIGHASH_TYPE, &[], &sighash.to_le_bytes());
        }
        if let Some(script) = &self.redeem_script {
            if !script.is_empty() {
                emit(out, PSBT_IN_REDEEM_SCRIPT, &[], script.as_bytes());
            }
        }
        if let Some(script) = &self.witness_script {
            if !script.is_empty() {
                emit(out, PSBT_IN_WITNESS_SCRIPT, &[], script.as_bytes());
            }
        }
        for (pk, origin) in &self.hd_keypaths {
            emit(out, PSBT_IN_BIP32_DERIVATION, pk, &keypath::serialize(origin));
        }
        if let Some(sig) = &self.tap_key_sig {
            if !sig.is_empty() {
                emit(out, PSBT_IN_TAP_KEY_SIG, &[], sig);
            }
        }
        for ((xonly, leaf_hash), sig) in &self.tap_script_sigs {
            let mut key = xonly.clone();
            key.extend_from_slice(leaf_hash);
            emit(out, PSBT_IN_TAP_SCRIPT_SIG, &key, sig);
        }
        for ((script, leaf_ver), control_blocks) in &self.tap_scripts {
            let mut value = script.as_bytes().to_vec();
            value.push(*leaf_ver);
            for control_block in control_blocks {
                emit(out, PSBT_IN_TAP_LEAF_SCRIPT, control_block, &value);
            }
        }
        for (xonly, (leaf_hashes, origin)) in &self.tap_key_origins {
            emit(
                out,
                PSBT_IN_TAP_BIP32_DERIVATION,
                xonly,
                &keypath::serialize_tap(leaf_hashes, origin),
            );
        }
        if let Some(key) = &self.tap_internal_key {
            emit(out, PSBT_IN_TAP_INTERNAL_KEY, &[], key);
        }
        if let Some(root) = &self.tap_merkle_root {
            emit(out, PSBT_IN_TAP_MERKLE_ROOT, &[], root);
        }
    }

    fn encode_finalized(&self, out: &mut Vec<u8>) {
        if let Some(tx) = &self.non_witness_utxo {
            emit(out, PSBT_IN_NON_WITNESS_UTXO, &[], &serialize(tx));
        }
        if let Some(txout) = &self.witness_utxo {
            emit(out, PSBT_IN_WITNESS_UTXO, &[], &serialize(txout));
        }
        if let Some(script) = &self.final_script_sig {
            if !script.is_empty() {
                emit(out, PSBT_IN_FINAL_SCRIPTSIG, &[], script.as_bytes());
            }
        }
        if let Some(witness) = &self.final_script_witness {
            if !witness.is_empty() {
                emit(out, PSBT_IN_FINAL_SCRIPTWITNESS, &[], &serialize(witness));
            }
        }
    }
}

fn emit(out: &mut Vec<u8>, key_type: u8, key_suffix: &[u8], value: &[u8]) {
    let mut key = vec![key_type];
    key.extend_from_slice(key_suffix);
    out.extend(ser_string(&key));
    out.extend(ser_string(value));
}

fn expect_pubkey_len(key_type: u8, suffix: &[u8]) -> Result<(), Error> {
    if suffix.len() == 33 || suffix.len() == 65 {
        Ok(())
    } else {
        Err(Error::bad_length(key_type))
    }
}

fn expect_sig_len(key_type: u8, value: &[u8]) -> Result<(), Error> {
    if value.len() == 64 || value.len() == 65 {
        Ok(())
    } else {
        Err(Error::bad_length(key_type))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::varint::CompactSizeMode;

    #[test]
    fn unfinalized_input_roundtrips() {
        let mut map = InputMap::default();
        map.sighash = Some(1);
        map.redeem_script = Some(Script::from(vec![0x51]));
        let mut bytes = Vec::new();
        map.encode(&mut bytes);
        let mut cur = Cursor::new(&bytes);
        let decoded =
            InputMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap();
        assert_eq!(decoded, map);
        assert!(!decoded.is_finalized());
    }

    #[test]
    fn tap_leaf_script_roundtrips_control_block_set() {
        let mut map = InputMap::default();
        let script = Script::from(vec![0x51]);
        let control_block = vec![0xc0; 33];
        map.tap_scripts
            .entry((script, 0xc0))
            .or_default()
            .insert(control_block);
        let mut bytes = Vec::new();
        map.encode(&mut bytes);
        let mut cur = Cursor::new(&bytes);
        let decoded =
            InputMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn duplicate_key_rejected() {
        let key = ser_string(&[PSBT_IN_SIGHASH_TYPE]);
        let value = ser_string(&1u32.to_le_bytes());
        let mut bytes = Vec::new();
        bytes.extend(&key);
        bytes.extend(&value);
        bytes.extend(&key);
        bytes.extend(&value);
        bytes.extend(ser_string(&[]));
        let mut cur = Cursor::new(&bytes);
        let err = InputMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(PSBT_IN_SIGHASH_TYPE)));
    }

    #[test]
    fn finalized_input_drops_presig_fields() {
        let mut map = InputMap::default();
        map.final_script_sig = Some(Script::from(vec![0x51]));
        map.sighash = Some(1); // dropped: input is finalized
        let mut bytes = Vec::new();
        map.encode(&mut bytes);
        let mut cur = Cursor::new(&bytes);
        let decoded =
            InputMap::decode(&mut cur, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE).unwrap();
        assert!(decoded.is_finalized());
        assert_eq!(decoded.sighash, None);
        assert_eq!(decoded.final_script_sig, map.final_script_sig);
    }
}
