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

use bitcoin::secp256k1::{self, Secp256k1};
use bitcoin::util::bip32::{self, ChainCode, ChildNumber, ExtendedPrivKey, ExtendedPubKey, Fingerprint};

use crate::SegmentIndexes;

/// Key material carried by an [`ExtendedKey`] — either just the public key
/// (an xpub, usable only for unhardened derivation) or the private key (an
/// xprv, from which the public key can always be recovered).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum KeyMaterial {
    /// Public key only; hardened derivation from this key is impossible.
    Public(secp256k1::PublicKey),
    /// Private key; both hardened and unhardened derivation are possible.
    Private(secp256k1::SecretKey),
}

impl KeyMaterial {
    /// `true` for [`KeyMaterial::Private`].
    pub fn is_private(&self) -> bool { matches!(self, KeyMaterial::Private(_)) }

    /// Serializes as found on the wire: 1-byte version marker (`0x00` for a
    /// private key, as in xprv serialization) followed by the 32 (private)
    /// or 33 (public, compressed-point) key bytes.
    pub fn to_bytes(self, secp: &Secp256k1<impl secp256k1::Signing>) -> [u8; 33] {
        let mut out = [0u8; 33];
        match self {
            KeyMaterial::Public(pk) => out.copy_from_slice(&pk.serialize()),
            KeyMaterial::Private(sk) => {
                out[0] = 0x00;
                out[1..].copy_from_slice(&sk.secret_bytes());
                let _ = secp;
            }
        }
        out
    }
}

/// Errors constructing or deriving from an [`ExtendedKey`].
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum XkeyError {
    /// extended key data must be exactly 78 bytes, found {0}.
    BadLength(usize),

    /// hardened derivation step {0} was requested from a public-only
    /// extended key.
    HardenedFromPublic(ChildNumber),

    /// invalid key material in extended key payload.
    #[from]
    Secp(secp256k1::Error),

    /// invalid BIP-32 extended key data.
    #[from]
    Bip32(bip32::Error),
}

/// An extended key (xpub or xprv) in its raw 78-byte BIP-32 form: version,
/// depth, parent fingerprint, child number, chain code and key material.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ExtendedKey {
    /// 4-byte network/type version prefix (e.g. `0x0488B21E` for mainnet
    /// xpub), carried through unchanged — this crate does not interpret it.
    pub version: [u8; 4],
    /// Number of derivation steps from the master key; `0` for a master key.
    pub depth: u8,
    /// Fingerprint of the direct parent key; all-zero for a master key.
    pub parent_fingerprint: Fingerprint,
    /// The child number this key was derived with from its parent.
    pub child_number: ChildNumber,
    /// BIP-32 chain code.
    pub chain_code: ChainCode,
    /// Public or private key material.
    pub key: KeyMaterial,
}

impl ExtendedKey {
    /// Serializes into the canonical 78-byte extended-key wire format.
    pub fn to_bytes(&self) -> [u8; 78] {
        let secp = Secp256k1::signing_only();
        let mut out = [0u8; 78];
        out[0..4].copy_from_slice(&self.version);
        out[4] = self.depth;
        out[5..9].copy_from_slice(self.parent_fingerprint.as_bytes());
        out[9..13].copy_from_slice(&self.child_number.to_derivation_value().to_be_bytes());
        out[13..45].copy_from_slice(self.chain_code.as_bytes());
        out[45..78].copy_from_slice(&self.key.to_bytes(&secp));
        out
    }

    /// Parses the canonical 78-byte extended-key wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XkeyError> {
        if bytes.len() != 78 {
            return Err(XkeyError::BadLength(bytes.len()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[0..4]);
        let depth = bytes[4];
        let parent_fingerprint = Fingerprint::from(&bytes[5..9]);
        let child_index = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
        let child_number = ChildNumber::from_derivation_value(child_index)?;
        let chain_code = ChainCode::from(&bytes[13..45]);
        let key = if bytes[45] == 0x00 {
            KeyMaterial::Private(secp256k1::SecretKey::from_slice(&bytes[46..78])?)
        } else {
            KeyMaterial::Public(secp256k1::PublicKey::from_slice(&bytes[45..78])?)
        };
        Ok(ExtendedKey { version, depth, parent_fingerprint, child_number, chain_code, key })
    }

    /// Derives a child key along `path`, delegating the actual HMAC-SHA512
    /// child-key-derivation math to [`bitcoin::util::bip32`], exactly as the
    /// `bitcoin` crate's own `ExtendedPubKey`/`ExtendedPrivKey` do.
    ///
    /// Fails with [`XkeyError::HardenedFromPublic`] if `path` requests a
    /// hardened step while `self.key` is [`KeyMaterial::Public`].
    pub fn derive(&self, path: &[ChildNumber]) -> Result<ExtendedKey, XkeyError> {
        let secp = Secp256k1::new();
        match self.key {
            KeyMaterial::Private(sk) => {
                let xprv = ExtendedPrivKey {
                    network: bitcoin::Network::Bitcoin,
                    depth: self.depth,
                    parent_fingerprint: self.parent_fingerprint,
                    child_number: self.child_number,
                    private_key: sk,
                    chain_code: self.chain_code,
                };
                let derived = xprv.derive_priv(&secp, &bip32::DerivationPath::from(path.to_vec()))?;
                Ok(ExtendedKey {
                    version: self.version,
                    depth: derived.depth,
                    parent_fingerprint: derived.parent_fingerprint,
                    child_number: derived.child_number,
                    chain_code: derived.chain_code,
                    key: KeyMaterial::Private(derived.private_key),
                })
            }
            KeyMaterial::Public(pk) => {
                if let Some(hardened) = path.iter().find(|cn| cn.is_hardened()) {
                    return Err(XkeyError::HardenedFromPublic(*hardened));
                }
                let xpub = ExtendedPubKey {
                    network: bitcoin::Network::Bitcoin,
                    depth: self.depth,
                    parent_fingerprint: self.parent_fingerprint,
                    child_number: self.child_number,
                    public_key: pk,
                    chain_code: self.chain_code,
                };
                let derived = xpub.derive_pub(&secp, &bip32::DerivationPath::from(path.to_vec()))?;
                Ok(ExtendedKey {
                    version: self.version,
                    depth: derived.depth,
                    parent_fingerprint: derived.parent_fingerprint,
                    child_number: derived.child_number,
                    chain_code: derived.chain_code,
                    key: KeyMaterial::Public(derived.public_key),
                })
            }
        }
    }

    /// Public key bytes (compressed, 33 bytes), computing the point from the
    /// private scalar when `self.key` is [`KeyMaterial::Private`].
    pub fn public_key_bytes(&self) -> [u8; 33] {
        match self.key {
            KeyMaterial::Public(pk) => pk.serialize(),
            KeyMaterial::Private(sk) => {
                let secp = Secp256k1::signing_only();
                secp256k1::PublicKey::from_secret_key(&secp, &sk).serialize()
            }
        }
    }

    /// Fingerprint of this key (first 4 bytes of `HASH160(pubkey)`).
    pub fn fingerprint(&self) -> Fingerprint {
        let hash = bitcoin::hashes::hash160::Hash::hash(&self.public_key_bytes());
        Fingerprint::from(&hash[0..4])
    }
}

impl Display for ExtendedKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&bitcoin::util::base58::check_encode_slice(&self.to_bytes()))
    }
}

impl FromStr for ExtendedKey {
    type Err = XkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bitcoin::util::base58::from_check(s).map_err(|_| XkeyError::BadLength(0))?;
        ExtendedKey::from_bytes(&bytes)
    }
}

impl From<ExtendedPubKey> for ExtendedKey {
    fn from(xpub: ExtendedPubKey) -> Self {
        ExtendedKey {
            version: if xpub.network == bitcoin::Network::Bitcoin { [0x04, 0x88, 0xB2, 0x1E] } else { [0x04, 0x35, 0x87, 0xCF] },
            depth: xpub.depth,
            parent_fingerprint: xpub.parent_fingerprint,
            child_number: xpub.child_number,
            chain_code: xpub.chain_code,
            key: KeyMaterial::Public(xpub.public_key),
        }
    }
}

impl From<ExtendedPrivKey> for ExtendedKey {
    fn from(xprv: ExtendedPrivKey) -> Self {
        ExtendedKey {
            version: if xprv.network == bitcoin::Network::Bitcoin { [0x04, 0x88, 0xAD, 0xE4] } else { [0x04, 0x35, 0x83, 0x94] },
            depth: xprv.depth,
            parent_fingerprint: xprv.parent_fingerprint,
            child_number: xprv.child_number,
            chain_code: xprv.chain_code,
            key: KeyMaterial::Private(xprv.private_key),
        }
    }
}

use bitcoin::hashes::Hash;

#[cfg(test)]
mod test {
    use super::*;

    const MASTER_XPRV: &str =
        "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPTfrEh2V2jUSKYEffC8MF9s6k76xKuxkZGnzPDC4V73BvaQSKyG1u2TJr";

    #[test]
    fn xprv_roundtrip() {
        let key = ExtendedKey::from_str(MASTER_XPRV).unwrap();
        assert_eq!(key.to_string(), MASTER_XPRV);
        assert!(key.key.is_private());
    }

    #[test]
    fn derive_hardened_from_private_succeeds() {
        let key = ExtendedKey::from_str(MASTER_XPRV).unwrap();
        let path = crate::parse_path("44h/0h/0h").unwrap();
        let child = key.derive(&path).unwrap();
        assert_eq!(child.depth, 3);
    }

    #[test]
    fn derive_hardened_from_public_fails() {
        let key = ExtendedKey::from_str(MASTER_XPRV).unwrap();
        let path = crate::parse_path("0").unwrap();
        let xpub = key.derive(&path).unwrap();
        let pubkey = ExtendedKey {
            key: KeyMaterial::Public(match xpub.key {
                KeyMaterial::Private(sk) => {
                    let secp = Secp256k1::signing_only();
                    secp256k1::PublicKey::from_secret_key(&secp, &sk)
                }
                KeyMaterial::Public(pk) => pk,
            }),
            ..xpub
        };
        let hardened_path = crate::parse_path("0h").unwrap();
        assert!(matches!(pubkey.derive(&hardened_path), Err(XkeyError::HardenedFromPublic(_))));
    }
}
