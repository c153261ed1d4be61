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

//! shared pallet types and traits
#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode};
pub use frame_support::log as logger;
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;
use sp_std::{collections::btree_map::BTreeMap, prelude::*};

use crosslink_primitives::{
	notarization::{CurrencyDefinition, CurrencyState, ProofRoot, ReserveTransfer},
	Balance, BlockNumber, ChainId, CurrencyId,
};

/// syntactic sugar for logging.
/// the caller must define a variable `LOG_TARGET = "<my-target>"`
#[macro_export]
macro_rules! log {
	($level:tt, $patter:expr $(, $values:expr)* $(,)?) => {
		crosslink_pallet_common::logger::$level!(
			target: crate::LOG_TARGET,
			$patter $(, $values)*
		)
	};
}

/// Knows the home chain's height-pinned proof roots
///
/// Computing a root (Merkle-mountain-range over blocks plus chain power)
/// belongs to the block indexer; the notarization core only reads them.
pub trait ProofRootSource {
	/// Return the home chain's proof root at `height`, or `None` if
	/// `height` is above the tip
	fn proof_root_at(height: BlockNumber) -> Option<ProofRoot>;
	/// Current tip height of the active chain
	fn tip_height() -> BlockNumber;
}

/// Registry of currency and chain definitions known to this node
pub trait CurrencyRegistry {
	/// The definition registered for `currency_id`, if any
	fn currency_definition(currency_id: &CurrencyId) -> Option<CurrencyDefinition>;
	/// The locally indexed state of a home-chain currency as of `height`
	fn currency_state_at(currency_id: &CurrencyId, height: BlockNumber) -> Option<CurrencyState>;
	/// Whether `currency_id` is a token hosted on this chain (tokens carry
	/// no proof roots)
	fn is_local_token(currency_id: &CurrencyId) -> bool;
}

/// An output materialized by applying reserve transfers
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct ImportOutput {
	pub currency: CurrencyId,
	pub amount: Balance,
	pub destination: Vec<u8>,
}

/// The value movements authorized by one application of reserve transfers
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct TransferOutcome {
	/// Outputs to materialize on this chain
	pub outputs: Vec<ImportOutput>,
	/// Total value imported, per currency
	pub imported: BTreeMap<CurrencyId, Balance>,
	/// Gateway deposits consumed to back the imports
	pub gateway_deposits_used: BTreeMap<CurrencyId, Balance>,
	/// Currency leaving this chain as a result of the transfers
	pub spent_currency_out: BTreeMap<CurrencyId, Balance>,
}

#[derive(Clone, Copy, PartialEq, Eq, RuntimeDebug)]
pub enum TransferExecutionError {
	/// The export bundle does not validate against the currency state
	InvalidExport,
	/// Reserve or supply arithmetic over/underflowed
	Arithmetic,
}

/// Executes reserve transfers against a currency state
///
/// The full conversion engine (cross-conversions, fee routing, gateway
/// accounting) lives behind this trait; the notarization transition
/// function drives it and owns the surrounding launch semantics.
pub trait ReserveTransferExecutor {
	/// Apply `transfers` to `state`, mutating reserves, supply, and
	/// conversion prices, and produce the authorized value movements
	fn apply_reserve_transfers(
		source_system: &ChainId,
		dest: &CurrencyDefinition,
		state: &mut CurrencyState,
		transfers: &[ReserveTransfer],
	) -> Result<TransferOutcome, TransferExecutionError>;
}
