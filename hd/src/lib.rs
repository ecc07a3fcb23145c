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

//! Hierarchical-deterministic key derivation for hardware-wallet support
//! code: key-origin information (master fingerprint + derivation path),
//! BIP-32 path parsing/formatting with all five hardened-index markers in
//! circulation, and a raw extended-key (xpub/xprv) codec that delegates its
//! child-key-derivation math to [`bitcoin::util::bip32`].

#[macro_use]
extern crate amplify;

#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod indexes;
mod path;
mod xkey;

pub use indexes::{
    HardenedIndex, HardenedIndexExpected, SegmentIndexes, UnhardenedIndex, UnhardenedIndexExpected,
    HARDENED_INDEX_BOUNDARY,
};
pub use path::{format_path, parse_path, HardenedMarker, KeyOriginInfo, PathParseError};
pub use xkey::{ExtendedKey, KeyMaterial, XkeyError};
