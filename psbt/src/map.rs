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

//! Shared plumbing for the per-map decode loop used by the global, input
//! and output maps (spec.md §4.4): read a `ser_string`-framed key, split
//! off its type byte, and track full key bytes seen so far so a repeat
//! triggers [`Error::DuplicateKey`].

use std::collections::BTreeSet;

use crate::errors::Error;
use crate::varint::{deser_string, CompactSizeMode, Cursor};

/// One raw `(key_type, key_suffix, full_key_bytes)` record read from a map,
/// or `None` at the zero-length-key map terminator.
pub(crate) fn read_key(
    cur: &mut Cursor,
    mode: CompactSizeMode,
    max_size: usize,
) -> Result<Option<(u8, Vec<u8>, Vec<u8>)>, Error> {
    let key_bytes = deser_string(cur, mode, max_size)?;
    if key_bytes.is_empty() {
        return Ok(None);
    }
    let key_type = key_bytes[0];
    let key_suffix = key_bytes[1..].to_vec();
    Ok(Some((key_type, key_suffix, key_bytes)))
}

/// Tracks full key bytes seen within a single map decode pass.
#[derive(Default)]
pub(crate) struct SeenKeys(BTreeSet<Vec<u8>>);

impl SeenKeys {
    pub(crate) fn new() -> Self { SeenKeys::default() }

    /// Records `key_bytes`, failing with [`Error::DuplicateKey`] if already
    /// seen in this map.
    pub(crate) fn check(&mut self, key_type: u8, key_bytes: Vec<u8>) -> Result<(), Error> {
        if !self.0.insert(key_bytes) {
            return Err(Error::duplicate(key_type));
        }
        Ok(())
    }
}

/// Checks a key-suffix (or value) length against an exact expectation.
pub(crate) fn expect_len(key_type: u8, bytes: &[u8], len: usize) -> Result<(), Error> {
    if bytes.len() != len {
        return Err(Error::bad_length(key_type));
    }
    Ok(())
}
