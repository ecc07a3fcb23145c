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

// Coding conventions
#![deny(dead_code, warnings)]

//! BIP-174/370/371 PSBT codec: a `GlobalMap`, a vector of `InputMap` and a
//! vector of `OutputMap`, base64-framed behind the `psbt\xff` magic bytes.
//! Decoding delegates the embedded transaction to [`bitcoin::Transaction`]'s
//! own consensus codec and layers the per-map key-type dispatch, duplicate
//! and length checks, and cross-checks on top.

#[macro_use]
extern crate amplify;

mod errors;
mod global;
mod input;
mod keypath;
mod map;
mod output;
mod varint;

pub use errors::Error;
pub use global::GlobalMap;
pub use input::InputMap;
pub use output::OutputMap;
pub use varint::{CompactSizeMode, DEFAULT_MAX_SIZE};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::varint::Cursor;

/// 5-byte PSBT magic: `"psbt"` followed by `0xff`.
pub const PSBT_MAGIC: [u8; 5] = [0x70, 0x73, 0x62, 0x74, 0xff];

/// A fully decoded Partially Signed Bitcoin Transaction (spec.md §3 `PSBT`).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Psbt {
    pub global: GlobalMap,
    pub inputs: Vec<InputMap>,
    pub outputs: Vec<OutputMap>,
}

impl Psbt {
    /// Decodes a raw (non-base64) PSBT byte stream, enforcing the magic
    /// bytes, the unsigned-tx/input/output count cross-check, and for every
    /// input carrying `non_witness_utxo`, that its txid matches the
    /// corresponding prevout hash (spec.md §4.4 step 4, §3 cross-invariants).
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        Self::decode_with(bytes, CompactSizeMode::Minimal, DEFAULT_MAX_SIZE)
    }

    /// As [`Self::decode`], with explicit varint-strictness and per-value
    /// size-cap overrides.
    pub fn decode_with(
        bytes: &[u8],
        mode: CompactSizeMode,
        max_size: usize,
    ) -> Result<Self, Error> {
        let mut cur = Cursor::new(bytes);
        let magic = cur.read_slice(PSBT_MAGIC.len())?;
        if magic != &PSBT_MAGIC[..] {
            return Err(Error::BadMagic);
        }
        let global = GlobalMap::decode(&mut cur, mode, max_size)?;

        let mut inputs = Vec::with_capacity(global.unsigned_tx.input.len());
        for _ in 0..global.unsigned_tx.input.len() {
            inputs.push(InputMap::decode(&mut cur, mode, max_size)?);
        }
        let mut outputs = Vec::with_capacity(global.unsigned_tx.output.len());
        for _ in 0..global.unsigned_tx.output.len() {
            outputs.push(OutputMap::decode(&mut cur, mode, max_size)?);
        }

        let psbt = Psbt { global, inputs, outputs };
        psbt.check_cross_invariants()?;
        Ok(psbt)
    }

    /// Parses a base64-framed PSBT, trimming surrounding ASCII whitespace
    /// before decoding (spec.md §4.4 step 1).
    pub fn from_base64(s: &str) -> Result<Self, Error> {
        let trimmed: String = s.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = BASE64.decode(trimmed)?;
        Self::decode(&bytes)
    }

    /// Serializes this PSBT to its raw (non-base64) byte stream.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PSBT_MAGIC);
        self.global.encode(&mut out);
        for input in &self.inputs {
            input.encode(&mut out);
        }
        for output in &self.outputs {
            output.encode(&mut out);
        }
        out
    }

    /// Serializes this PSBT to its base64 wire form.
    pub fn to_base64(&self) -> String { BASE64.encode(self.encode()) }

    fn check_cross_invariants(&self) -> Result<(), Error> {
        if self.inputs.len() != self.global.unsigned_tx.input.len() {
            return Err(Error::CrossCheckFailed("input map count does not match unsigned_tx.vin"));
        }
        if self.outputs.len() != self.global.unsigned_tx.output.len() {
            return Err(Error::CrossCheckFailed("output map count does not match unsigned_tx.vout"));
        }
        for (txin, input) in self.global.unsigned_tx.input.iter().zip(&self.inputs) {
            if let Some(prev_tx) = &input.non_witness_utxo {
                if prev_tx.txid() != txin.previous_output.txid {
                    return Err(Error::CrossCheckFailed(
                        "non_witness_utxo txid does not match prevout hash",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bitcoin::blockdata::transaction::{OutPoint, TxIn, TxOut};
    use bitcoin::{PackedLockTime, Script, Sequence, Transaction, Witness};

    fn sample_tx() -> Transaction {
        Transaction {
            version: 2,
            lock_time: PackedLockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: Script::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut { value: 1000, script_pubkey: Script::new() }],
        }
    }

    fn sample_psbt() -> Psbt {
        Psbt {
            global: GlobalMap {
                unsigned_tx: sample_tx(),
                xpubs: Default::default(),
                unknown: Default::default(),
            },
            inputs: vec![InputMap::default()],
            outputs: vec![OutputMap::default()],
        }
    }

    #[test]
    fn base64_roundtrip() {
        let psbt = sample_psbt();
        let encoded = psbt.to_base64();
        let decoded = Psbt::from_base64(&encoded).unwrap();
        assert_eq!(decoded, psbt);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"notpsbt".to_vec();
        assert!(matches!(Psbt::decode(&bytes), Err(Error::BadMagic)));
    }

    #[test]
    fn rejects_input_count_mismatch() {
        // decode() always consumes exactly unsigned_tx.input.len() input
        // maps off the wire by construction, so this cross-check can only
        // be exercised against a directly-constructed Psbt value.
        let mut psbt = sample_psbt();
        psbt.inputs.push(InputMap::default());
        assert!(matches!(psbt.check_cross_invariants(), Err(Error::CrossCheckFailed(_))));
    }

    #[test]
    fn rejects_mismatched_non_witness_utxo_txid() {
        let mut psbt = sample_psbt();
        let mut other_tx = sample_tx();
        other_tx.version = 3;
        psbt.inputs[0].non_witness_utxo = Some(other_tx);
        let bytes = psbt.encode();
        assert!(matches!(Psbt::decode(&bytes), Err(Error::CrossCheckFailed(_))));
    }

    #[test]
    fn whitespace_in_base64_is_trimmed() {
        let psbt = sample_psbt();
        let encoded = psbt.to_base64();
        let with_whitespace = format!(" {}\n{} ", &encoded[..encoded.len() / 2], &encoded[encoded.len() / 2..]);
        let decoded = Psbt::from_base64(&with_whitespace).unwrap();
        assert_eq!(decoded, psbt);
    }
}
