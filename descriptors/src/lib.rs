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

// Coding conventions
#![deny(dead_code, warnings)]

//! BIP-380 output-script descriptor grammar (`pkh`/`wpkh`/`sh(wpkh(...))`/
//! `multi`/`sortedmulti`, BIP-382/383), its BIP-380 checksum, and the
//! `[origin]key/deriv` key-expression mini-language shared by descriptors
//! and PSBT `BIP32_DERIVATION` fields.

#[macro_use]
extern crate amplify;

mod checksum;
mod descriptor;
mod pubkey;

pub use checksum::{add_checksum, descriptor_checksum, strip_and_verify_checksum, ChecksumError};
pub use descriptor::{Descriptor, Error, ExpandedScripts, MultisigDescriptor};
pub use pubkey::{KeyPayload, PubkeyParseError, PubkeyProvider};
