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

//! BIP-380 descriptor checksum: an 8-character base32-ish check code
//! appended to a descriptor string after `#`, computed with a polynomial
//! code over GF(32) (ported from the reference C++/Python implementation).

const INPUT_CHARSET: &str =
    "0123456789()[],'/*abcdefgh@:$%{}IJKLMNOPQRSTUVWXYZ&+-.;<=>?!^_|~ijklmnopqrstuvwxyzABCDEFGH`#\"\\ ";
const CHECKSUM_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

fn poly_mod(mut c: u64, val: u64) -> u64 {
    let c0 = c >> 35;
    c = ((c & 0x7_ffff_ffff) << 5) ^ val;
    if c0 & 1 != 0 {
        c ^= 0xf5_dee5_1989;
    }
    if c0 & 2 != 0 {
        c ^= 0xa9_fdca_3312;
    }
    if c0 & 4 != 0 {
        c ^= 0x1b_ab10_e32d;
    }
    if c0 & 8 != 0 {
        c ^= 0x37_06b1_677a;
    }
    if c0 & 16 != 0 {
        c ^= 0x64_4d62_6ffd;
    }
    c
}

/// Computes the 8-character BIP-380 checksum of a descriptor string
/// (without the trailing `#checksum` part). Returns `None` if `desc`
/// contains a character outside the 94-character descriptor charset.
pub fn descriptor_checksum(desc: &str) -> Option<String> {
    let mut c: u64 = 1;
    let mut cls: u64 = 0;
    let mut clscount: u32 = 0;
    for ch in desc.chars() {
        let pos = INPUT_CHARSET.find(ch)? as u64;
        c = poly_mod(c, pos & 31);
        cls = cls * 3 + (pos >> 5);
        clscount += 1;
        if clscount == 3 {
            c = poly_mod(c, cls);
            cls = 0;
            clscount = 0;
        }
    }
    if clscount > 0 {
        c = poly_mod(c, cls);
    }
    for _ in 0..8 {
        c = poly_mod(c, 0);
    }
    c ^= 1;

    let checksum_chars: Vec<char> = CHECKSUM_CHARSET.chars().collect();
    let mut ret = String::with_capacity(8);
    for j in 0..8 {
        ret.push(checksum_chars[((c >> (5 * (7 - j))) & 31) as usize]);
    }
    Some(ret)
}

/// Appends `#<checksum>` to a descriptor string.
pub fn add_checksum(desc: &str) -> String {
    let checksum = descriptor_checksum(desc).expect("descriptor must only use the descriptor charset");
    format!("{}#{}", desc, checksum)
}

/// Splits a descriptor string on its optional `#checksum` suffix and
/// verifies it if present. Returns the descriptor body with the checksum
/// stripped.
pub fn strip_and_verify_checksum(s: &str) -> Result<&str, ChecksumError> {
    let mut parts = s.splitn(3, '#');
    let body = parts.next().unwrap_or("");
    let checksum = parts.next();
    if parts.next().is_some() {
        return Err(ChecksumError::MultipleChecksums);
    }
    if let Some(checksum) = checksum {
        if checksum.len() != 8 {
            return Err(ChecksumError::BadLength(checksum.len()));
        }
        let expected = descriptor_checksum(body).ok_or(ChecksumError::BadChar)?;
        if expected != checksum {
            return Err(ChecksumError::Mismatch { expected, found: checksum.to_owned() });
        }
    }
    Ok(body)
}

/// Errors validating a descriptor's `#checksum` suffix.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ChecksumError {
    /// descriptor contains more than one `#` separator.
    MultipleChecksums,

    /// checksum must be exactly 8 characters, found {0}.
    BadLength(usize),

    /// descriptor body contains a character outside the descriptor charset.
    BadChar,

    /// checksum mismatch: expected {expected}, found {found}.
    Mismatch { expected: String, found: String },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_checksum() {
        let desc = "pkh([d34db33f/44h/0h/0h]xpub6ERApfZwUNrhLCkDtcHTcxd75RbzS1ed54G1LkBUHQVHQKqhMkhgbmJbZRkrgZw4koxb5JaHWkY4ALHY2grBGRjaDMzQLcgJvLJuZZvRcEL/1/*)";
        assert_eq!(descriptor_checksum(desc).as_deref(), Some("gw2sk4e2"));
    }

    #[test]
    fn add_and_verify_roundtrip() {
        let desc = "wpkh([d34db33f/84h/0h/0h]xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8/0/*)";
        let full = add_checksum(desc);
        let stripped = strip_and_verify_checksum(&full).unwrap();
        assert_eq!(stripped, desc);
    }

    #[test]
    fn rejects_tampered_checksum() {
        let full = format!("{}#{}", "pkh(00)", "aaaaaaaa");
        assert!(strip_and_verify_checksum(&full).is_err());
    }
}
