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

use bitcoin::consensus::encode;

/// Errors decoding or encoding a PSBT, one of its maps, or a raw
/// byte-stream primitive underneath it.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// stream does not start with the PSBT magic bytes `psbt\xff`.
    BadMagic,

    /// input stream ended before a complete record (or the embedded
    /// transaction) could be read.
    Truncated,

    /// key or value for PSBT field type {0:#04x} has the wrong length.
    BadLength(u8),

    /// full key bytes for PSBT field type {0:#04x} repeat within one map.
    DuplicateKey(u8),

    /// declared value does not match its cross-checked counterpart: {0}
    CrossCheckFailed(&'static str),

    /// embedded transaction failed to decode: {0}
    #[from]
    #[display(inner)]
    Tx(encode::Error),

    /// base64 PSBT framing is malformed: {0}
    #[from]
    #[display(inner)]
    Base64(base64::DecodeError),

    /// a decoded value would require allocating more than the configured
    /// maximum of {0} bytes.
    OversizedValue(usize),
}

impl Error {
    pub(crate) fn bad_length(key_type: u8) -> Self { Error::BadLength(key_type) }

    pub(crate) fn duplicate(key_type: u8) -> Self { Error::DuplicateKey(key_type) }
}
