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

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bitcoin::util::bip32::{self, ChildNumber, Fingerprint};

use crate::SegmentIndexes;

/// Which of the five hardened-derivation markers accepted by BIP-380
/// (`'`, `h`, `H`) and hwilib (`p`, `P`) a path was written with, or should
/// be emitted with.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub enum HardenedMarker {
    /// `'`
    Apostrophe,
    /// `h` — the default emitted by [`format_path`].
    #[default]
    LowerH,
    /// `H`
    UpperH,
    /// `p`
    LowerP,
    /// `P`
    UpperP,
}

impl HardenedMarker {
    fn as_char(self) -> char {
        match self {
            HardenedMarker::Apostrophe => '\'',
            HardenedMarker::LowerH => 'h',
            HardenedMarker::UpperH => 'H',
            HardenedMarker::LowerP => 'p',
            HardenedMarker::UpperP => 'P',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            '\'' => Some(HardenedMarker::Apostrophe),
            'h' => Some(HardenedMarker::LowerH),
            'H' => Some(HardenedMarker::UpperH),
            'p' => Some(HardenedMarker::LowerP),
            'P' => Some(HardenedMarker::UpperP),
            _ => None,
        }
    }
}

/// Error parsing a derivation path string (either the bare `/0/1h/2` suffix
/// form, or a `[fingerprint/path]` key-origin bracket).
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PathParseError {
    /// path segment {0} is not a valid decimal index.
    BadIndex(String),

    /// path index {0} is out of the unhardened/hardened 31-bit range.
    #[from]
    Overflow(bip32::Error),

    /// key origin is missing the closing `]` bracket.
    UnterminatedOrigin,

    /// key origin fingerprint {0} is not 8 hexadecimal characters.
    BadFingerprint(String),
}

/// Parses a derivation path of the form `0/1h/2'/3H` (no leading `m/`),
/// accepting any of the five hardened markers BIP-380 and hwilib recognise
/// and mixing them freely within one path.
pub fn parse_path(s: &str) -> Result<Vec<ChildNumber>, PathParseError> {
    if s.is_empty() {
        return Ok(vec![]);
    }
    s.split('/').map(parse_path_segment).collect()
}

fn parse_path_segment(segment: &str) -> Result<ChildNumber, PathParseError> {
    let mut chars = segment.chars();
    let marker = chars.next_back().filter(|c| HardenedMarker::from_char(*c).is_some());
    let digits = match marker {
        Some(_) => &segment[..segment.len() - 1],
        None => segment,
    };
    let index: u32 = digits
        .parse()
        .map_err(|_| PathParseError::BadIndex(segment.to_owned()))?;
    if index >= crate::HARDENED_INDEX_BOUNDARY {
        return Err(PathParseError::BadIndex(segment.to_owned()));
    }
    Ok(if marker.is_some() {
        ChildNumber::from_derivation_value(index + crate::HARDENED_INDEX_BOUNDARY)?
    } else {
        ChildNumber::from_derivation_value(index)?
    })
}

/// Formats a derivation path using the given hardened marker, without a
/// leading `m/` and without a leading `/` (callers that need the bracketed
/// `[fp/path]` form add the separating `/` themselves).
pub fn format_path(path: &[ChildNumber], marker: HardenedMarker) -> String {
    path.iter()
        .map(|cn| match cn {
            ChildNumber::Normal { index } => index.to_string(),
            ChildNumber::Hardened { index } => format!("{}{}", index, marker.as_char()),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Master-key fingerprint plus the ordered list of child indexes taken from
/// it, i.e. the information carried by a PSBT `BIP32_DERIVATION` value or a
/// descriptor's `[fingerprint/path]` key-origin bracket.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct KeyOriginInfo {
    /// Fingerprint of the master key this path is rooted at.
    pub fingerprint: Fingerprint,
    /// Ordered derivation steps from the master key to the described key.
    pub derivation: Vec<ChildNumber>,
}

impl KeyOriginInfo {
    /// Constructs key origin information.
    pub fn new(fingerprint: Fingerprint, derivation: Vec<ChildNumber>) -> Self {
        KeyOriginInfo { fingerprint, derivation }
    }

    /// Serializes to the PSBT wire form: 4-byte fingerprint followed by one
    /// little-endian `u32` per derivation step (BIP-174 `DeserializeHDKeypath`
    /// counterpart).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.derivation.len() * 4);
        out.extend_from_slice(self.fingerprint.as_bytes());
        for cn in &self.derivation {
            out.extend_from_slice(&cn.to_derivation_value().to_le_bytes());
        }
        out
    }

    /// Parses the PSBT wire form produced by [`KeyOriginInfo::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PathParseError> {
        if bytes.len() < 4 || (bytes.len() - 4) % 4 != 0 {
            return Err(PathParseError::BadFingerprint(format!(
                "key origin value must be 4 + 4n bytes, got {}",
                bytes.len()
            )));
        }
        let fingerprint = Fingerprint::from(&bytes[0..4]);
        let derivation = bytes[4..]
            .chunks_exact(4)
            .map(|chunk| {
                let index = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                ChildNumber::from_derivation_value(index).map_err(PathParseError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyOriginInfo { fingerprint, derivation })
    }

    /// Parses a `[fingerprint/path]` bracketed string (brackets included).
    pub fn parse_bracket(s: &str) -> Result<Self, PathParseError> {
        let inner = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or(PathParseError::UnterminatedOrigin)?;
        let (fp, path) = inner.split_once('/').unwrap_or((inner, ""));
        if fp.len() != 8 || !fp.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PathParseError::BadFingerprint(fp.to_owned()));
        }
        let mut fp_bytes = [0u8; 4];
        for (i, byte) in fp_bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&fp[i * 2..i * 2 + 2], 16)
                .map_err(|_| PathParseError::BadFingerprint(fp.to_owned()))?;
        }
        Ok(KeyOriginInfo {
            fingerprint: Fingerprint::from(fp_bytes),
            derivation: parse_path(path)?,
        })
    }

    /// Formats as a `[fingerprint/path]` bracketed string using the given
    /// hardened marker.
    pub fn to_bracket_string(&self, marker: HardenedMarker) -> String {
        let path = format_path(&self.derivation, marker);
        if path.is_empty() {
            format!("[{}]", self.fingerprint)
        } else {
            format!("[{}/{}]", self.fingerprint, path)
        }
    }
}

impl Display for KeyOriginInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bracket_string(HardenedMarker::default()))
    }
}

impl FromStr for KeyOriginInfo {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { KeyOriginInfo::parse_bracket(s) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_mixed_hardened_markers() {
        let path = parse_path("0/1h/2'/3H/4p/5P").unwrap();
        assert_eq!(path.len(), 6);
        assert!(path[0].is_normal());
        for cn in &path[1..] {
            assert!(cn.is_hardened());
        }
    }

    #[test]
    fn bracket_roundtrips() {
        let origin = KeyOriginInfo::parse_bracket("[d34db33f/44h/0h/0h]").unwrap();
        assert_eq!(origin.fingerprint, Fingerprint::from([0xd3, 0x4d, 0xb3, 0x3f]));
        assert_eq!(origin.derivation.len(), 3);
        assert_eq!(origin.to_bracket_string(HardenedMarker::LowerH), "[d34db33f/44h/0h/0h]");
    }

    #[test]
    fn byte_roundtrip() {
        let origin = KeyOriginInfo::parse_bracket("[d34db33f/44h/0h/0h/0/0]").unwrap();
        let bytes = origin.to_bytes();
        let back = KeyOriginInfo::from_bytes(&bytes).unwrap();
        assert_eq!(origin, back);
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert!(parse_path("5000000000").is_err());
    }
}
