// Bitcoin descriptor wallet library
// Written in 2019-2021 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

// Coding conventions
#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code
)]

//! Umbrella crate for hardware-wallet PSBT and descriptor support.
//!
//! This crate carries no logic of its own: it re-exports [`bitcoin_hd`]
//! (key-origin info, derivation paths, the extended-key codec),
//! [`descriptors`] (the BIP-380 descriptor grammar and checksum) and
//! [`psbt`] (the BIP-174/370/371 PSBT codec) so that a downstream consumer
//! — a device transport, a CLI, a signer — can depend on one crate instead
//! of three. Device transports, USB/HID plumbing, a command-line surface,
//! signing and script evaluation are the job of that downstream consumer,
//! not of this workspace.

pub use bitcoin_hd as hd;
pub use descriptors;
pub use psbt;
