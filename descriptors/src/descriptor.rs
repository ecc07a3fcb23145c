// Descriptor wallet library extending bitcoin & miniscript functionality
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bitcoin::blockdata::opcodes::all as opcodes;
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::Script;
use bitcoin_hd::HardenedMarker;

use crate::checksum::{add_checksum, strip_and_verify_checksum, ChecksumError};
use crate::pubkey::{PubkeyParseError, PubkeyProvider};

/// Errors parsing or expanding a [`Descriptor`].
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// invalid descriptor checksum.
    #[from]
    #[display(inner)]
    Checksum(ChecksumError),

    /// failed to parse a key expression: {0}
    #[from]
    #[display(inner)]
    Pubkey(PubkeyParseError),

    /// descriptor wrapper {0} is not one of the recognized forms (`pk`,
    /// `pkh`, `wpkh`, `sh(wpkh(...))`, `multi`, `sortedmulti`).
    UnsupportedForm(String),

    /// threshold {threshold} is out of the valid `1..=keys.len()` range for
    /// a {keys}-key multisig.
    InvalidThreshold { threshold: u8, keys: usize },

    /// multisig descriptor names {0} keys, exceeding the 16-key limit
    /// enforced by `OP_CHECKMULTISIG`.
    TooManyKeys(usize),

    /// multisig descriptor names no keys.
    NoKeys,
}

/// The `multi(...)` / `sortedmulti(...)` payload: a signing threshold and
/// its ordered list of key expressions (source order, as written — for
/// `sortedmulti` the per-position sort happens only at [`Descriptor::expand`]
/// time, never in the stored/serialized order).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MultisigDescriptor {
    pub threshold: u8,
    pub keys: Vec<PubkeyProvider>,
}

impl MultisigDescriptor {
    fn validate(threshold: u8, keys: &[PubkeyProvider]) -> Result<(), Error> {
        if keys.is_empty() {
            return Err(Error::NoKeys);
        }
        if keys.len() > 16 {
            return Err(Error::TooManyKeys(keys.len()));
        }
        if threshold < 1 || threshold as usize > keys.len() {
            return Err(Error::InvalidThreshold { threshold, keys: keys.len() });
        }
        Ok(())
    }

    fn new(threshold: u8, keys: Vec<PubkeyProvider>) -> Result<Self, Error> {
        Self::validate(threshold, &keys)?;
        Ok(MultisigDescriptor { threshold, keys })
    }

    fn to_inner_string(&self, marker: HardenedMarker) -> String {
        let mut s = self.threshold.to_string();
        for key in &self.keys {
            s.push(',');
            s.push_str(&key.to_string_with_marker(marker));
        }
        s
    }
}

/// A parsed output-script descriptor: one of the six leaf forms defined by
/// BIP-380/382/383 that this hardware-wallet core understands.
///
/// `tr(...)`, `sh(wsh(...))`, raw `sh(...)`/`wsh(...)` miniscript and nested
/// policy combinators are out of this core's scope (see spec.md §1); a
/// caller needing those feeds the string to a full miniscript descriptor
/// parser instead.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Descriptor {
    /// `pk(key)` — bare pubkey script.
    Pk(PubkeyProvider),
    /// `pkh(key)` — P2PKH.
    Pkh(PubkeyProvider),
    /// `wpkh(key)` — native P2WPKH.
    Wpkh(PubkeyProvider),
    /// `sh(wpkh(key))` — P2SH-wrapped P2WPKH.
    ShWpkh(PubkeyProvider),
    /// `multi(thresh, keys...)` — bare `OP_CHECKMULTISIG` script, keys in
    /// the order written.
    Multi(MultisigDescriptor),
    /// `sortedmulti(thresh, keys...)` — like `Multi`, but [`Descriptor::expand`]
    /// sorts the per-position-derived pubkeys lexicographically before
    /// assembling the script.
    SortedMulti(MultisigDescriptor),
}

/// The scripts produced by [`Descriptor::expand`] for a single derivation
/// position.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ExpandedScripts {
    /// The scriptPubKey itself.
    pub output_script: Script,
    /// The redeem script, for `sh(...)` forms (`ShWpkh`); `None` otherwise.
    pub redeem_script: Option<Script>,
}

impl Descriptor {
    /// Parses a descriptor string, with or without a trailing `#checksum`.
    /// If a checksum is present it is verified; [`Error::Checksum`] on
    /// mismatch or malformed suffix.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let body = strip_and_verify_checksum(s)?;
        Self::parse_body(body)
    }

    fn parse_body(body: &str) -> Result<Self, Error> {
        if let Some(inner) = unwrap(body, "sh(wpkh(", "))") {
            return Ok(Descriptor::ShWpkh(PubkeyProvider::parse(inner)?));
        }
        if let Some(inner) = unwrap(body, "wpkh(", ")") {
            return Ok(Descriptor::Wpkh(PubkeyProvider::parse(inner)?));
        }
        if let Some(inner) = unwrap(body, "pkh(", ")") {
            return Ok(Descriptor::Pkh(PubkeyProvider::parse(inner)?));
        }
        if let Some(inner) = unwrap(body, "pk(", ")") {
            return Ok(Descriptor::Pk(PubkeyProvider::parse(inner)?));
        }
        if let Some(inner) = unwrap(body, "sortedmulti(", ")") {
            return Ok(Descriptor::SortedMulti(parse_multi(inner)?));
        }
        if let Some(inner) = unwrap(body, "multi(", ")") {
            return Ok(Descriptor::Multi(parse_multi(inner)?));
        }
        Err(Error::UnsupportedForm(wrapper_name(body)))
    }

    /// Serializes back to a descriptor string (without a checksum), using
    /// `marker` for hardened steps in each key's origin path.
    pub fn to_string_with_marker(&self, marker: HardenedMarker) -> String {
        match self {
            Descriptor::Pk(key) => format!("pk({})", key.to_string_with_marker(marker)),
            Descriptor::Pkh(key) => format!("pkh({})", key.to_string_with_marker(marker)),
            Descriptor::Wpkh(key) => format!("wpkh({})", key.to_string_with_marker(marker)),
            Descriptor::ShWpkh(key) => {
                format!("sh(wpkh({}))", key.to_string_with_marker(marker))
            }
            Descriptor::Multi(multi) => format!("multi({})", multi.to_inner_string(marker)),
            Descriptor::SortedMulti(multi) => {
                format!("sortedmulti({})", multi.to_inner_string(marker))
            }
        }
    }

    /// Serializes using the default hardened marker (`h`) and appends the
    /// BIP-380 checksum.
    pub fn to_string_with_checksum(&self) -> String {
        add_checksum(&self.to_string_with_marker(HardenedMarker::default()))
    }

    /// Expands this descriptor at derivation position `pos`, substituting
    /// any trailing `*` wildcard in each key expression with `pos`.
    pub fn expand(&self, pos: u32) -> Result<ExpandedScripts, Error> {
        Ok(match self {
            Descriptor::Pk(key) => {
                let pk = key.pubkey_bytes(pos)?;
                ExpandedScripts {
                    output_script: Builder::new()
                        .push_slice(&pk)
                        .push_opcode(opcodes::OP_CHECKSIG)
                        .into_script(),
                    redeem_script: None,
                }
            }
            Descriptor::Pkh(key) => {
                let pk = key.pubkey_bytes(pos)?;
                let hash = hash160::Hash::hash(&pk);
                ExpandedScripts {
                    output_script: Builder::new()
                        .push_opcode(opcodes::OP_DUP)
                        .push_opcode(opcodes::OP_HASH160)
                        .push_slice(&hash[..])
                        .push_opcode(opcodes::OP_EQUALVERIFY)
                        .push_opcode(opcodes::OP_CHECKSIG)
                        .into_script(),
                    redeem_script: None,
                }
            }
            Descriptor::Wpkh(key) => {
                let pk = key.pubkey_bytes(pos)?;
                let hash = hash160::Hash::hash(&pk);
                ExpandedScripts {
                    output_script: witness_program_v0(&hash[..]),
                    redeem_script: None,
                }
            }
            Descriptor::ShWpkh(key) => {
                let pk = key.pubkey_bytes(pos)?;
                let hash = hash160::Hash::hash(&pk);
                let redeem_script = witness_program_v0(&hash[..]);
                let redeem_hash = hash160::Hash::hash(redeem_script.as_bytes());
                ExpandedScripts {
                    output_script: Builder::new()
                        .push_opcode(opcodes::OP_HASH160)
                        .push_slice(&redeem_hash[..])
                        .push_opcode(opcodes::OP_EQUAL)
                        .into_script(),
                    redeem_script: Some(redeem_script),
                }
            }
            Descriptor::Multi(multi) => ExpandedScripts {
                output_script: multisig_script(multi, pos, false)?,
                redeem_script: None,
            },
            Descriptor::SortedMulti(multi) => ExpandedScripts {
                output_script: multisig_script(multi, pos, true)?,
                redeem_script: None,
            },
        })
    }
}

impl Display for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with_checksum())
    }
}

impl FromStr for Descriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Descriptor::parse(s) }
}

fn multisig_script(multi: &MultisigDescriptor, pos: u32, sorted: bool) -> Result<Script, Error> {
    let mut pubkeys = multi
        .keys
        .iter()
        .map(|key| key.pubkey_bytes(pos).map_err(Error::from))
        .collect::<Result<Vec<_>, _>>()?;
    if sorted {
        pubkeys.sort();
    }
    // `push_int` encodes 1..=16 as `OP_1`..`OP_16` (`0x50+k`), matching the
    // `multi()` expand rule in spec.md §4.7.
    let mut builder = Builder::new().push_int(multi.threshold as i64);
    for pk in &pubkeys {
        builder = builder.push_slice(pk);
    }
    builder = builder
        .push_int(multi.keys.len() as i64)
        .push_opcode(opcodes::OP_CHECKMULTISIG);
    Ok(builder.into_script())
}

fn witness_program_v0(hash: &[u8]) -> Script {
    Builder::new().push_int(0).push_slice(hash).into_script()
}

fn parse_multi(inner: &str) -> Result<MultisigDescriptor, Error> {
    let mut parts = inner.split(',');
    let threshold_str = parts
        .next()
        .ok_or_else(|| Error::UnsupportedForm(inner.to_owned()))?;
    let threshold: u8 = threshold_str
        .parse()
        .map_err(|_| Error::UnsupportedForm(inner.to_owned()))?;
    let keys = parts
        .map(PubkeyProvider::parse)
        .collect::<Result<Vec<_>, _>>()?;
    MultisigDescriptor::new(threshold, keys)
}

fn unwrap<'a>(body: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    body.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
}

fn wrapper_name(body: &str) -> String {
    body.split_once('(').map(|(name, _)| name).unwrap_or(body).to_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

    #[test]
    fn parses_wpkh_roundtrip() {
        let desc_str = format!(
            "wpkh([d34db33f/84h/0h/0h]{}/0/*)",
            XPUB
        );
        let with_checksum = add_checksum(&desc_str);
        let descriptor = Descriptor::parse(&with_checksum).unwrap();
        assert!(matches!(descriptor, Descriptor::Wpkh(_)));
        assert_eq!(descriptor.to_string(), with_checksum);
    }

    #[test]
    fn rejects_bad_checksum() {
        let desc_str = format!("wpkh([d34db33f/84h/0h/0h]{}/0/*)#aaaaaaaa", XPUB);
        assert!(matches!(Descriptor::parse(&desc_str), Err(Error::Checksum(_))));
    }

    #[test]
    fn multi_expand_unsorted_keeps_order() {
        let pk1 = "022f01e5e15cca351daff3843fb70f3c2f0a1bdd05e5af888a67784ef3e10a2a01";
        let pk2 = "03acd484e2f0c7f65309ad178a9f559abde09796974c57e714c35f110dfc27ccd";
        let pk3 = "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c";
        let desc = Descriptor::parse(&add_checksum(&format!("multi(2,{},{},{})", pk1, pk2, pk3)))
            .unwrap();
        let expanded = desc.expand(0).unwrap();
        let script_bytes = expanded.output_script.as_bytes();
        assert_eq!(script_bytes[0], 0x52);
        assert_eq!(script_bytes[script_bytes.len() - 1], 0xae);
    }

    #[test]
    fn sortedmulti_sorts_pubkeys() {
        let pk1 = "03acd484e2f0c7f65309ad178a9f559abde09796974c57e714c35f110dfc27ccd";
        let pk2 = "022f01e5e15cca351daff3843fb70f3c2f0a1bdd05e5af888a67784ef3e10a2a01";
        let desc = Descriptor::parse(&add_checksum(&format!("sortedmulti(2,{},{})", pk1, pk2)))
            .unwrap();
        let expanded = desc.expand(0).unwrap();
        let script_bytes = expanded.output_script.as_bytes();
        // pk2 < pk1 lexicographically, so pk2's bytes must appear first.
        let pk2_bytes = hex_decode(pk2);
        let pos = script_bytes
            .windows(pk2_bytes.len())
            .position(|w| w == pk2_bytes.as_slice())
            .unwrap();
        assert!(pos < 5);
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let pk = "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c";
        let err = parse_multi(&format!("3,{}", pk)).unwrap_err();
        assert!(matches!(err, Error::InvalidThreshold { .. }));
    }

    #[test]
    fn sh_wpkh_produces_redeem_script() {
        let pk = "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c";
        let desc = Descriptor::parse(&add_checksum(&format!("sh(wpkh({}))", pk))).unwrap();
        let expanded = desc.expand(0).unwrap();
        assert!(expanded.redeem_script.is_some());
    }

    fn hex_decode(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }
}
