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

use bitcoin::util::bip32::ChildNumber;
use bitcoin_hd::{format_path, parse_path, ExtendedKey, HardenedMarker, KeyOriginInfo, XkeyError};
use lazy_static::lazy_static;
use regex::Regex;

/// A key as it appears in a key expression, before any origin/derivation
/// wrapping: either a raw 33- or 65-byte public key, or an extended key.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum KeyPayload {
    /// Compressed (33-byte) or uncompressed (65-byte) secp256k1 public key.
    Pubkey(Vec<u8>),
    /// An extended public or private key.
    Extended(ExtendedKey),
}

/// Errors parsing a key expression (`[origin]key/deriv`) within a descriptor.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PubkeyParseError {
    /// key-origin bracket `[...]` is not closed.
    UnterminatedOrigin,

    /// key material is neither a valid hex-encoded public key nor a valid
    /// extended key: {0}
    BadKey(String),

    /// failed to parse a derivation path: {0}
    #[from]
    Path(bitcoin_hd::PathParseError),

    /// a wildcard (`*`) step may only appear as the final derivation
    /// segment.
    WildcardNotFinal,

    /// hardened derivation was requested from a public-only extended key.
    #[from]
    Derive(XkeyError),
}

lazy_static! {
    static ref RE_HEX_PUBKEY: Regex =
        Regex::new(r"^(0[2-3][0-9A-Fa-f]{64}|04[0-9A-Fa-f]{128})$")
            .expect("wrong build-in pubkey regex parsing syntax");
}

/// A key expression within a descriptor: an optional `[fingerprint/path]`
/// origin, the key itself (bare pubkey or extended key), and an optional
/// `/deriv/path` suffix for extended keys, which may end in a `*` wildcard.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PubkeyProvider {
    /// Key origin information, if the expression carries a `[...]` bracket.
    pub origin: Option<KeyOriginInfo>,
    /// The raw pubkey or extended key text exactly as written (used to
    /// reproduce the original string on `to_string`).
    pub key_str: String,
    /// Parsed key material.
    pub key: KeyPayload,
    /// Derivation suffix exactly as written (including the leading `/`),
    /// e.g. `/1/*`, if present.
    pub deriv_path: Option<String>,
}

impl PubkeyProvider {
    /// Parses a key expression (without any surrounding `multi(...)`
    /// wrapping).
    pub fn parse(s: &str) -> Result<Self, PubkeyParseError> {
        let mut rest = s;
        let origin = if rest.starts_with('[') {
            let end = rest.find(']').ok_or(PubkeyParseError::UnterminatedOrigin)?;
            let bracket = &rest[..=end];
            rest = &rest[end + 1..];
            Some(KeyOriginInfo::parse_bracket(bracket)?)
        } else {
            None
        };

        let slash_idx = rest.find('/');
        let (key_str, deriv_path) = match slash_idx {
            Some(idx) => (&rest[..idx], Some(rest[idx..].to_owned())),
            None => (rest, None),
        };

        if let Some(ref path) = deriv_path {
            let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
            for (i, seg) in segments.iter().enumerate() {
                if *seg == "*" && i != segments.len() - 1 {
                    return Err(PubkeyParseError::WildcardNotFinal);
                }
            }
        }

        let key = if RE_HEX_PUBKEY.is_match(key_str) {
            KeyPayload::Pubkey(hex_decode(key_str).ok_or_else(|| PubkeyParseError::BadKey(key_str.to_owned()))?)
        } else {
            KeyPayload::Extended(
                ExtendedKey::from_str(key_str).map_err(|_| PubkeyParseError::BadKey(key_str.to_owned()))?,
            )
        };

        Ok(PubkeyProvider { origin, key_str: key_str.to_owned(), key, deriv_path })
    }

    /// Serializes back to a key expression string, using `marker` for any
    /// hardened steps in the origin path (the derivation suffix is kept
    /// verbatim, as written).
    pub fn to_string_with_marker(&self, marker: HardenedMarker) -> String {
        let mut s = String::new();
        if let Some(ref origin) = self.origin {
            s.push_str(&origin.to_bracket_string(marker));
        }
        s.push_str(&self.key_str);
        if let Some(ref path) = self.deriv_path {
            s.push_str(path);
        }
        s
    }

    /// Expands to the raw compressed-or-uncompressed public key bytes at
    /// derivation position `pos`, substituting `pos` for a trailing `*`
    /// wildcard.
    ///
    /// This corrects a bug present in the reference Python implementation,
    /// which replaces the wildcard with `"*" + str(pos)` (prepending the
    /// literal `*` character) instead of substituting it; the correct
    /// behaviour — replacing the trailing `*` with `pos` — is implemented
    /// here.
    pub fn pubkey_bytes(&self, pos: u32) -> Result<Vec<u8>, PubkeyParseError> {
        match &self.key {
            KeyPayload::Pubkey(bytes) => Ok(bytes.clone()),
            KeyPayload::Extended(xkey) => match &self.deriv_path {
                None => Ok(xkey.public_key_bytes().to_vec()),
                Some(path) => {
                    let path = self.resolved_path_segments(path, pos)?;
                    let derived = xkey.derive(&path)?;
                    Ok(derived.public_key_bytes().to_vec())
                }
            },
        }
    }

    fn resolved_path_segments(&self, deriv_path: &str, pos: u32) -> Result<Vec<ChildNumber>, PubkeyParseError> {
        let trimmed = deriv_path.trim_start_matches('/');
        let resolved = if let Some(stripped) = trimmed.strip_suffix('*') {
            format!("{}{}", stripped, pos)
        } else {
            trimmed.to_owned()
        };
        Ok(parse_path(&resolved)?)
    }

    /// Returns the full signable derivation path from the master key,
    /// including the origin, with a trailing `*` wildcard resolved to `pos`.
    pub fn full_derivation_path(&self, pos: u32) -> Result<Vec<ChildNumber>, PubkeyParseError> {
        let mut path = self.origin.as_ref().map(|o| o.derivation.clone()).unwrap_or_default();
        if let Some(ref deriv) = self.deriv_path {
            path.extend(self.resolved_path_segments(deriv, pos)?);
        }
        Ok(path)
    }

    /// Formats [`PubkeyProvider::full_derivation_path`] as an `m/...` string.
    pub fn full_derivation_path_string(&self, pos: u32, marker: HardenedMarker) -> Result<String, PubkeyParseError> {
        let path = self.full_derivation_path(pos)?;
        Ok(format!("m/{}", format_path(&path, marker)))
    }
}

impl Display for PubkeyProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with_marker(HardenedMarker::default()))
    }
}

impl FromStr for PubkeyProvider {
    type Err = PubkeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { PubkeyProvider::parse(s) }
}

impl PartialOrd for PubkeyProvider {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}

impl Ord for PubkeyProvider {
    /// Orders by the raw key string, matching hwilib's `PubkeyProvider.__lt__`
    /// (used to canonically order `sortedmulti()` keys).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering { self.key_str.cmp(&other.key_str) }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

    #[test]
    fn parses_bare_pubkey() {
        let pk = "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c";
        let provider = PubkeyProvider::parse(pk).unwrap();
        assert!(provider.origin.is_none());
        assert_eq!(provider.pubkey_bytes(0).unwrap().len(), 33);
    }

    #[test]
    fn parses_origin_and_wildcard() {
        let expr = format!("[d34db33f/84h/0h/0h]{}/0/*", XPUB);
        let provider = PubkeyProvider::parse(&expr).unwrap();
        assert!(provider.origin.is_some());
        let a = provider.pubkey_bytes(0).unwrap();
        let b = provider.pubkey_bytes(1).unwrap();
        assert_ne!(a, b);
        assert_eq!(provider.to_string(), expr);
    }

    #[test]
    fn wildcard_must_be_final() {
        let expr = format!("{}/*/0", XPUB);
        assert!(matches!(PubkeyProvider::parse(&expr), Err(PubkeyParseError::WildcardNotFinal)));
    }

    #[test]
    fn full_derivation_path_includes_origin() {
        let expr = format!("[d34db33f/84h/0h/0h]{}/0/*", XPUB);
        let provider = PubkeyProvider::parse(&expr).unwrap();
        let path = provider.full_derivation_path_string(7, HardenedMarker::LowerH).unwrap();
        assert_eq!(path, "m/84h/0h/0h/0/7");
    }
}
