// Copyright 2022-2023 Futureverse Corporation Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
// You may obtain a copy of the License at the root of this project source code

//! Common types across runtimes, pallets, and/or client
#![cfg_attr(not(feature = "std"), no_std)]

pub use opaque::*;
pub use types::*;

pub mod notarization;
pub mod notary;

/// offchain storage config key for the peer system's JSON-RPC HTTP URI
// for consistency expect 4 byte key for prefix and 8 byte key for subkeys
pub const PEER_HTTP_URI: [u8; 9] = *b"PEER_HTTP";

pub mod types {
	use sp_runtime::{
		traits::{BlakeTwo256, IdentifyAccount, Verify},
		MultiSignature,
	};

	/// An index to a block.
	pub type BlockNumber = u32;

	/// Alias to the signature scheme used for chain transactions.
	pub type Signature = MultiSignature;

	/// Some way of identifying an account on the chain. We intentionally make it equivalent
	/// to the public key of our transaction signing scheme.
	pub type AccountId = <<Signature as Verify>::Signer as IdentifyAccount>::AccountId;

	/// Balance of an account or a currency reserve.
	pub type Balance = u128;

	/// Index of a transaction in the chain.
	pub type Nonce = u32;

	/// A hash of some data used by the chain.
	pub type Hash = sp_core::H256;

	/// The identity address of a registered chain (system)
	pub type ChainId = sp_core::H160;

	/// The identity address of a registered currency
	/// The home system's currency id equals its chain id
	pub type CurrencyId = sp_core::H160;

	pub type Timestamp = u64;

	/// Blake2-256 Hash implementation.
	pub type BlakeTwo256Hash = BlakeTwo256;
}

/// Opaque types. These are used by the CLI to instantiate machinery that don't need to know
/// the specifics of the runtime. They can then be made to be agnostic over specific formats
/// of data like extrinsics, allowing for them to continue syncing the network through upgrades
/// to even the core data structures.
pub mod opaque {
	use super::*;
	use sp_runtime::{generic, traits::BlakeTwo256};

	pub use sp_runtime::OpaqueExtrinsic as UncheckedExtrinsic;
	/// Opaque block header type.
	pub type Header = generic::Header<BlockNumber, BlakeTwo256>;
	/// Opaque block type.
	pub type Block = generic::Block<Header, UncheckedExtrinsic>;
	/// Opaque block identifier type.
	pub type BlockId = generic::BlockId<Block>;
}

#[derive(PartialEq)]
pub enum OffchainErr {
	/// The peer system did not answer or answered garbage
	NoNotary,
	/// The peer agreed with none of the proof roots we submitted
	NoMatchingProofRoots,
	/// There is no unconfirmed notarization eligible for progress
	NoValidUnconfirmed,
	/// The notary block period for an earned notarization has not elapsed
	TooEarly,
	/// No controlled notary key is in the active notary set
	NotANotary,
	/// Failed to submit the unsigned transaction
	SubmitTransaction,
	/// Local state is inconsistent, try again next block
	Internal,
}

impl sp_std::fmt::Debug for OffchainErr {
	fn fmt(&self, fmt: &mut sp_std::fmt::Formatter) -> sp_std::fmt::Result {
		match *self {
			OffchainErr::NoNotary => write!(fmt, "Peer system unreachable or invalid"),
			OffchainErr::NoMatchingProofRoots => write!(fmt, "No matching proof roots found"),
			OffchainErr::NoValidUnconfirmed => write!(fmt, "No valid unconfirmed notarization"),
			OffchainErr::TooEarly => write!(fmt, "Too early to notarize again"),
			OffchainErr::NotANotary => write!(fmt, "Is not an active notary"),
			OffchainErr::SubmitTransaction => write!(fmt, "Failed to submit transaction"),
			OffchainErr::Internal => write!(fmt, "Local chain state inconsistent"),
		}
	}
}
