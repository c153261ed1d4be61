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

//! Cross-chain notarization record types
//!
//! A notarization is an attestation linking the state of two chains: a
//! height-pinned proof root of the attested system together with the
//! currency states known at that height. Records chain to their
//! predecessor by output reference and are finalized by notary evidence.

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::{H256, U256};
use sp_io::hashing::keccak_256;
use sp_runtime::{Permill, RuntimeDebug};
use sp_std::{collections::btree_map::BTreeMap, prelude::*};

use crate::{
	notary::crypto::NotaryId,
	types::{AccountId, Balance, BlockNumber, ChainId, CurrencyId},
};

/// A stable reference to a notarization, evidence, or finalization record
/// (transaction id + output index)
#[derive(
	Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Encode, Decode, RuntimeDebug, TypeInfo,
)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct OutputRef {
	pub txid: H256,
	pub index: u32,
}

impl OutputRef {
	pub fn new(txid: H256, index: u32) -> Self {
		Self { txid, index }
	}
}

/// The proof protocol family a proof root belongs to
#[derive(Copy, Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum ProofRootKind {
	/// A chain speaking the home protocol
	#[codec(index = 1)]
	Native,
	/// An Ethereum-protocol bridge
	#[codec(index = 2)]
	Ethereum,
}

impl Default for ProofRootKind {
	fn default() -> Self {
		Self::Native
	}
}

// wire form is the raw discriminant, matching the peer's JSON
impl Serialize for ProofRootKind {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u8(match self {
			Self::Native => 1,
			Self::Ethereum => 2,
		})
	}
}

impl<'de> Deserialize<'de> for ProofRootKind {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		match u8::deserialize(deserializer)? {
			1 => Ok(Self::Native),
			2 => Ok(Self::Ethereum),
			other => Err(serde::de::Error::custom(format_args!("unknown proof root type: {}", other))),
		}
	}
}

/// A height-pinned cryptographic commitment to a chain's state
///
/// For a given `(chain_id, root_height)` exactly one valid root exists in a
/// canonical chain; two roots at the same height with different state roots
/// indicate a fork. Immutable once constructed.
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo, Serialize, Deserialize)]
pub struct ProofRoot {
	/// The attested system
	#[serde(rename = "systemid")]
	pub chain_id: ChainId,
	/// Height of the attested chain this root commits to
	#[serde(rename = "height")]
	pub root_height: BlockNumber,
	/// Merkle-mountain-range root over blocks `[0, root_height]`
	#[serde(rename = "stateroot")]
	pub state_root: H256,
	/// Hash of the block at `root_height`
	#[serde(rename = "blockhash")]
	pub block_hash: H256,
	/// Compact representation of accumulated chain power at `root_height`
	#[serde(rename = "power")]
	pub compact_power: U256,
	#[serde(rename = "type")]
	pub kind: ProofRootKind,
}

/// Economic snapshot of a currency: reserves, supply, prices, launch flags
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo, Serialize, Deserialize)]
pub struct CurrencyState {
	pub flags: u16,
	#[serde(rename = "currencyid")]
	pub currency_id: CurrencyId,
	/// Reserve currencies, parallel to `reserves`/`preconverted`/prices
	pub currencies: Vec<CurrencyId>,
	/// Current reserves held, per reserve currency
	pub reserves: Vec<Balance>,
	/// Cumulative pre-launch contributions, per reserve currency
	pub preconverted: Vec<Balance>,
	#[serde(rename = "initialsupply")]
	pub initial_supply: Balance,
	pub supply: Balance,
	pub emitted: Balance,
	#[serde(rename = "conversionprice")]
	pub conversion_price: Vec<Balance>,
	#[serde(rename = "viaconversionprice")]
	pub via_conversion_price: Vec<Balance>,
}

impl CurrencyState {
	pub const FLAG_PRELAUNCH: u16 = 0b0000_0001;
	pub const FLAG_LAUNCH_CLEAR: u16 = 0b0000_0010;
	pub const FLAG_LAUNCH_CONFIRMED: u16 = 0b0000_0100;
	pub const FLAG_REFUNDING: u16 = 0b0000_1000;
	pub const FLAG_LAUNCH_COMPLETE: u16 = 0b0001_0000;

	pub fn is_prelaunch(&self) -> bool {
		self.flags & Self::FLAG_PRELAUNCH != 0
	}
	pub fn set_prelaunch(&mut self) {
		self.flags |= Self::FLAG_PRELAUNCH;
	}
	pub fn clear_prelaunch(&mut self) {
		self.flags &= !Self::FLAG_PRELAUNCH;
	}
	pub fn is_launch_clear(&self) -> bool {
		self.flags & Self::FLAG_LAUNCH_CLEAR != 0
	}
	pub fn set_launch_clear(&mut self) {
		self.flags |= Self::FLAG_LAUNCH_CLEAR;
	}
	pub fn is_launch_confirmed(&self) -> bool {
		self.flags & Self::FLAG_LAUNCH_CONFIRMED != 0
	}
	/// Mark the launch confirmed. Mutually exclusive with refunding once the
	/// launch is clear.
	pub fn set_launch_confirmed(&mut self) {
		self.flags &= !Self::FLAG_REFUNDING;
		self.flags |= Self::FLAG_LAUNCH_CONFIRMED;
	}
	pub fn is_refunding(&self) -> bool {
		self.flags & Self::FLAG_REFUNDING != 0
	}
	pub fn set_refunding(&mut self) {
		self.flags &= !Self::FLAG_LAUNCH_CONFIRMED;
		self.flags |= Self::FLAG_REFUNDING;
	}
	pub fn is_launch_complete(&self) -> bool {
		self.flags & Self::FLAG_LAUNCH_COMPLETE != 0
	}
	/// One-way: never cleared once set
	pub fn set_launch_complete(&mut self) {
		self.flags |= Self::FLAG_LAUNCH_COMPLETE;
	}

	/// Restore the canonical pre-launch starting point: supply back to the
	/// initial supply, emissions reverted, reserves to the accumulated
	/// pre-launch contribution totals. Independent of the order transfers
	/// were processed in.
	pub fn revert_reserves_and_supply(&mut self) {
		self.supply = self.initial_supply;
		self.emitted = 0;
		self.reserves = self.preconverted.clone();
	}

	/// All parallel vectors agree in length
	pub fn is_valid(&self) -> bool {
		let n = self.currencies.len();
		self.reserves.len() == n &&
			self.preconverted.len() == n &&
			self.conversion_price.len() == n &&
			self.via_conversion_price.len() == n
	}
}

/// A single cross-chain value transfer inside an export bundle
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct ReserveTransfer {
	pub flags: u16,
	/// The currency being moved
	pub currency: CurrencyId,
	pub amount: Balance,
	pub fee_currency: CurrencyId,
	pub fee: Balance,
	/// The currency the transfer lands in (conversion target or credit)
	pub dest_currency: CurrencyId,
	/// Opaque destination (address encoding is the transaction engine's concern)
	pub destination: Vec<u8>,
}

impl ReserveTransfer {
	pub const FLAG_PRECONVERT: u16 = 0b0000_0001;
	pub const FLAG_CONVERT: u16 = 0b0000_0010;
	pub const FLAG_REFUND: u16 = 0b0000_0100;
	pub const FLAG_CROSS_SYSTEM: u16 = 0b0000_1000;

	pub fn is_preconversion(&self) -> bool {
		self.flags & Self::FLAG_PRECONVERT != 0
	}
	pub fn is_conversion(&self) -> bool {
		self.flags & Self::FLAG_CONVERT != 0
	}
	pub fn is_refund(&self) -> bool {
		self.flags & Self::FLAG_REFUND != 0
	}

	/// The canonical "return to sender" form of this transfer.
	///
	/// Idempotent: refunding a refund is a no-op.
	pub fn into_refund(self) -> Self {
		if self.is_refund() {
			return self
		}
		let mut refund = self;
		refund.flags &= !(Self::FLAG_PRECONVERT | Self::FLAG_CONVERT);
		refund.flags |= Self::FLAG_REFUND;
		refund.dest_currency = refund.currency;
		refund
	}
}

/// Network hint for reaching a peer chain node
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct NodeData {
	pub address: Vec<u8>,
	pub identity: ChainId,
}

/// One proposed/confirmed attestation linking chains
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct Notarization {
	pub version: u8,
	pub flags: u16,
	/// Beneficiary of any notarization reward
	pub proposer: AccountId,
	/// The system this record primarily attests
	pub currency_id: CurrencyId,
	pub notarization_height: BlockNumber,
	pub prev_height: BlockNumber,
	/// Reference to the previous record on this thread; `None` only for
	/// definition and block-one records
	pub prev_notarization: Option<OutputRef>,
	/// Canonical hash of the previous record's serialized form
	pub hash_prev_notarization: H256,
	/// State of `currency_id` at `notarization_height`
	pub currency_state: CurrencyState,
	/// States of other currencies known at this height; never contains
	/// `currency_id`
	pub currency_states: BTreeMap<CurrencyId, CurrencyState>,
	pub proof_roots: BTreeMap<ChainId, ProofRoot>,
	pub nodes: Vec<NodeData>,
}

/// Why a mirror flip was refused
#[derive(PartialEq, Eq, RuntimeDebug)]
pub enum MirrorError {
	/// The record is already in its mirrored orientation
	AlreadyMirrored,
	/// The record holds no currency state for the counterpart system
	MissingCounterpartState,
}

impl Notarization {
	pub const VERSION_FIRST: u8 = 1;
	pub const VERSION_CURRENT: u8 = 1;
	pub const VERSION_LAST: u8 = 1;

	pub const FLAG_DEFINITION: u16 = 0b0000_0001;
	pub const FLAG_BLOCK_ONE: u16 = 0b0000_0010;
	pub const FLAG_PRELAUNCH: u16 = 0b0000_0100;
	pub const FLAG_LAUNCH_CLEARED: u16 = 0b0000_1000;
	pub const FLAG_REFUNDING: u16 = 0b0001_0000;
	pub const FLAG_LAUNCH_CONFIRMED: u16 = 0b0010_0000;
	pub const FLAG_MIRROR: u16 = 0b0100_0000;
	pub const FLAG_SAME_CHAIN: u16 = 0b1000_0000;

	pub fn has_flag(&self, flag: u16) -> bool {
		self.flags & flag != 0
	}
	pub fn set_flag(&mut self, flag: u16) {
		self.flags |= flag;
	}
	pub fn clear_flag(&mut self, flag: u16) {
		self.flags &= !flag;
	}
	pub fn is_definition(&self) -> bool {
		self.has_flag(Self::FLAG_DEFINITION)
	}
	pub fn is_block_one(&self) -> bool {
		self.has_flag(Self::FLAG_BLOCK_ONE)
	}
	pub fn is_prelaunch(&self) -> bool {
		self.has_flag(Self::FLAG_PRELAUNCH)
	}
	pub fn is_launch_cleared(&self) -> bool {
		self.has_flag(Self::FLAG_LAUNCH_CLEARED)
	}
	pub fn is_mirror(&self) -> bool {
		self.has_flag(Self::FLAG_MIRROR)
	}

	/// Version in the accepted range, non-null subject, internal counts
	/// consistent
	pub fn is_valid(&self) -> bool {
		self.version >= Self::VERSION_FIRST &&
			self.version <= Self::VERSION_LAST &&
			!self.currency_id.is_zero() &&
			self.prev_height <= self.notarization_height &&
			!self.currency_states.contains_key(&self.currency_id) &&
			self.currency_state.is_valid() &&
			self.currency_states.values().all(|s| s.is_valid())
	}

	/// Canonical hash of this record: keccak over the serialized form,
	/// without any length prefix
	pub fn hash(&self) -> H256 {
		keccak_256(&self.encode()).into()
	}

	/// Swap the "from" and "to" perspective of this record so it can be
	/// accepted on the opposite chain.
	///
	/// One-shot: a record already in its mirrored orientation cannot be
	/// mirrored again, and only the returned [`MirroredNotarization`] can
	/// enter acceptance validation.
	pub fn into_mirror(mut self, counterpart: ChainId) -> Result<MirroredNotarization, MirrorError> {
		if self.is_mirror() {
			return Err(MirrorError::AlreadyMirrored)
		}
		let counterpart_state = self
			.currency_states
			.remove(&counterpart)
			.ok_or(MirrorError::MissingCounterpartState)?;
		let prior_primary = sp_std::mem::replace(&mut self.currency_state, counterpart_state);
		self.currency_states.insert(self.currency_id, prior_primary);
		self.currency_id = counterpart;
		self.set_flag(Self::FLAG_MIRROR);
		self.clear_flag(Self::FLAG_SAME_CHAIN);
		Ok(MirroredNotarization(self))
	}
}

/// A notarization whose perspective has been flipped for acceptance on this
/// chain. Constructible only through [`Notarization::into_mirror`].
#[derive(Clone, PartialEq, Eq, RuntimeDebug)]
pub struct MirroredNotarization(Notarization);

impl MirroredNotarization {
	pub fn inner(&self) -> &Notarization {
		&self.0
	}
	pub fn inner_mut(&mut self) -> &mut Notarization {
		&mut self.0
	}
	pub fn into_inner(self) -> Notarization {
		self.0
	}
}

/// How notarizations of a currency reach finality
#[derive(Copy, Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum NotarizationProtocol {
	/// Finalized by `min_notaries_confirm` notary signatures of one polarity
	#[codec(index = 1)]
	NotaryConfirm,
	/// Automatic finalization (test mode only, rejected in production)
	#[codec(index = 2)]
	Auto,
	/// The notary chain itself is authoritative; no finalization outputs
	#[codec(index = 3)]
	NotaryChainId,
}

impl Default for NotarizationProtocol {
	fn default() -> Self {
		Self::NotaryConfirm
	}
}

/// Registry view of a currency or chain definition
///
/// Registration itself (names, identity proofs, launch funding) is the
/// currency registry's concern; this carries what the notarization core
/// needs.
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct CurrencyDefinition {
	pub currency_id: CurrencyId,
	/// The system this currency lives on
	pub system_id: ChainId,
	/// The system hosting the currency's launch
	pub launch_system_id: ChainId,
	pub start_block: BlockNumber,
	pub options: u8,
	/// Reserve currencies, parallel to the preconversion bounds
	pub currencies: Vec<CurrencyId>,
	/// Launch funding committed at definition, per reserve currency
	pub contributions: Vec<Balance>,
	/// Componentwise minimum preconversions for the launch to confirm;
	/// empty means no minimum
	pub min_preconversion: Vec<Balance>,
	/// Componentwise preconversion caps; empty means uncapped
	pub max_preconversion: Vec<Balance>,
	pub preconversion_fee: Permill,
	pub notaries: Vec<NotaryId>,
	pub min_notaries_confirm: u32,
	pub notarization_protocol: NotarizationProtocol,
}

impl CurrencyDefinition {
	pub const OPTION_FRACTIONAL: u8 = 0b0000_0001;
	pub const OPTION_TOKEN: u8 = 0b0000_0010;

	pub fn is_fractional(&self) -> bool {
		self.options & Self::OPTION_FRACTIONAL != 0
	}
	pub fn is_token(&self) -> bool {
		self.options & Self::OPTION_TOKEN != 0
	}
}
