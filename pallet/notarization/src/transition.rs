/* Copyright 2021-2022 Centrality Investments Limited
 *
 * Licensed under the LGPL, Version 3.0 (the "License");
 * you may not use this file except in compliance with the License.
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 * You may obtain a copy of the License at the root of this project source code,
 * or at:
 *     https://centrality.ai/licenses/gplv3.txt
 *     https://centrality.ai/licenses/lgplv3.txt
 */

//! The notarization transition function
//!
//! Derives the next notarization from a prior one plus a bundle of
//! cross-chain reserve transfers: validates and substitutes refunds in
//! place, runs the launch clearing protocol around a currency's start
//! block, and applies the transfers through the reserve transfer executor
//! (twice for fractional currencies, so import outputs are priced with the
//! post-transfer conversion prices and free of rounding drift).

use codec::Encode;
use sp_core::H256;
use sp_io::hashing::keccak_256;
use sp_std::{collections::btree_map::BTreeMap, prelude::*};

use crosslink_pallet_common::{ImportOutput, ReserveTransferExecutor, TransferExecutionError};
use crosslink_primitives::{
	notarization::{CurrencyDefinition, Notarization, ReserveTransfer},
	Balance, BlockNumber, ChainId, CurrencyId,
};

/// The full result of one notarization transition
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NotarizationTransition {
	/// Hash over the pre-mutation transfer values
	pub transfer_hash: H256,
	/// The derived notarization
	pub notarization: Notarization,
	/// Outputs to materialize on this chain
	pub outputs: Vec<ImportOutput>,
	/// Total value imported, per currency
	pub imported: BTreeMap<CurrencyId, Balance>,
	/// Gateway deposits consumed to back the imports
	pub gateway_deposits_used: BTreeMap<CurrencyId, Balance>,
	/// Currency leaving this chain
	pub spent_currency_out: BTreeMap<CurrencyId, Balance>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TransitionError {
	/// A transfer application pass reported an invalid export
	InvalidExport,
	/// The prior state or definition is internally inconsistent
	Internal,
}

impl From<TransferExecutionError> for TransitionError {
	fn from(err: TransferExecutionError) -> Self {
		match err {
			TransferExecutionError::InvalidExport => Self::InvalidExport,
			TransferExecutionError::Arithmetic => Self::Internal,
		}
	}
}

/// Derive the next notarization for `dest` from `prior`.
///
/// `transfers` is in/out: invalid pre-conversions and early conversions are
/// replaced by their refund forms in place, preserving order.
pub fn next_notarization_info<E: ReserveTransferExecutor>(
	prior: &Notarization,
	source_system: &ChainId,
	home_chain: &ChainId,
	dest: &CurrencyDefinition,
	last_export_height: BlockNumber,
	current_height: BlockNumber,
	transfers: &mut Vec<ReserveTransfer>,
) -> Result<NotarizationTransition, TransitionError> {
	// 1. copy and reparent
	let mut new = prior.clone();
	new.clear_flag(Notarization::FLAG_DEFINITION);
	new.prev_notarization = None;
	new.prev_height = prior.notarization_height;
	new.notarization_height = current_height;
	new.hash_prev_notarization = prior.hash();

	// the hash commits to the transfers as submitted, before any refund
	// substitution below
	let transfer_hash = hash_transfers(transfers);

	// 2. a refunding currency makes no further economic progress
	if new.currency_state.is_refunding() {
		return Ok(NotarizationTransition {
			transfer_hash,
			notarization: new,
			outputs: vec![],
			imported: Default::default(),
			gateway_deposits_used: Default::default(),
			spent_currency_out: Default::default(),
		})
	}

	let state = &mut new.currency_state;
	if state.currencies != dest.currencies || !state.is_valid() {
		return Err(TransitionError::Internal)
	}

	// 3. validation pass: substitute refunds in place, accumulate valid
	// pre-conversions into the launch reserves
	for transfer in transfers.iter_mut() {
		if transfer.is_preconversion() {
			if last_export_height >= dest.start_block {
				*transfer = transfer.clone().into_refund();
				continue
			}
			let Some(idx) = dest.currencies.iter().position(|c| c == &transfer.currency) else {
				// contribution in a currency the launch does not reserve
				*transfer = transfer.clone().into_refund();
				continue
			};
			let fee = dest.preconversion_fee.mul_floor(transfer.amount);
			let new_reserve_in = transfer.amount.saturating_sub(fee);
			let total = state.reserves[idx]
				.checked_add(new_reserve_in)
				.ok_or(TransitionError::Internal)?;
			if let Some(cap) = dest.max_preconversion.get(idx) {
				if total > *cap {
					*transfer = transfer.clone().into_refund();
					continue
				}
			}
			state.reserves[idx] = total;
			state.preconverted[idx] = state.preconverted[idx]
				.checked_add(new_reserve_in)
				.ok_or(TransitionError::Internal)?;
		} else if transfer.is_conversion() && !state.is_launch_complete() {
			*transfer = transfer.clone().into_refund();
		}
	}

	// 4. launch window for currencies this system hosts
	if dest.launch_system_id == *source_system &&
		current_height <= dest.start_block.saturating_sub(1)
	{
		if current_height == dest.start_block.saturating_sub(1) && new.is_prelaunch() {
			if new.is_launch_cleared() {
				// second pass through the clearing block
				new.clear_flag(Notarization::FLAG_PRELAUNCH);
				new.currency_state.set_launch_clear();
				new.currency_state.revert_reserves_and_supply();
				new.currency_state.clear_prelaunch();
			} else {
				new.set_flag(Notarization::FLAG_LAUNCH_CLEARED);
				new.currency_state.set_launch_clear();
				new.currency_state.revert_reserves_and_supply();
				new.currency_state.clear_prelaunch();

				// reserves now hold exactly the pre-converted totals;
				// decide the launch against the configured minimum
				let minimum_met = dest
					.min_preconversion
					.iter()
					.enumerate()
					.all(|(i, min)| new.currency_state.reserves.get(i).unwrap_or(&0) >= min);
				if minimum_met {
					new.currency_state.set_launch_confirmed();
					new.set_flag(Notarization::FLAG_LAUNCH_CONFIRMED);
				} else {
					new.currency_state.supply = 0;
					new.currency_state.set_refunding();
					new.set_flag(Notarization::FLAG_REFUNDING);
				}
			}
		} else if current_height < dest.start_block.saturating_sub(1) {
			new.set_flag(Notarization::FLAG_PRELAUNCH);
			new.currency_state.set_prelaunch();
			if prior.is_definition() {
				// definition-time contributions are funding, not preconversions
				for (i, contribution) in dest.contributions.iter().enumerate() {
					if let Some(reserve) = new.currency_state.reserves.get_mut(i) {
						*reserve = reserve.saturating_sub(*contribution);
					}
				}
			}
		}

		let outcome =
			E::apply_reserve_transfers(source_system, dest, &mut new.currency_state, transfers)?;
		return Ok(NotarizationTransition {
			transfer_hash,
			notarization: new,
			outputs: outcome.outputs,
			imported: outcome.imported,
			gateway_deposits_used: outcome.gateway_deposits_used,
			spent_currency_out: outcome.spent_currency_out,
		})
	}

	// 5. post-launch
	new.currency_state.set_launch_complete();
	new.clear_flag(Notarization::FLAG_LAUNCH_CLEARED);
	if dest.system_id != *home_chain {
		new.clear_flag(Notarization::FLAG_SAME_CHAIN);
	}

	// first application establishes the post-transfer state and its
	// conversion prices; outputs are discarded
	let mut first_pass = new.currency_state.clone();
	let first = E::apply_reserve_transfers(source_system, dest, &mut first_pass, transfers)?;

	let outcome = if dest.is_fractional() && !new.currency_state.is_prelaunch() {
		// second application prices the old state with the new prices so
		// import outputs carry no per-pass rounding drift on the reserves
		let mut second_pass = new.currency_state.clone();
		second_pass.conversion_price = first_pass.conversion_price.clone();
		second_pass.via_conversion_price = first_pass.via_conversion_price.clone();
		let second =
			E::apply_reserve_transfers(source_system, dest, &mut second_pass, transfers)?;
		new.currency_state = second_pass;
		second
	} else {
		new.currency_state = first_pass;
		first
	};

	Ok(NotarizationTransition {
		transfer_hash,
		notarization: new,
		outputs: outcome.outputs,
		imported: outcome.imported,
		gateway_deposits_used: outcome.gateway_deposits_used,
		spent_currency_out: outcome.spent_currency_out,
	})
}

/// Hash an export bundle: keccak over the concatenated serialized
/// transfers, without any sequence-length prefix
pub fn hash_transfers(transfers: &[ReserveTransfer]) -> H256 {
	let mut buf = Vec::new();
	for transfer in transfers {
		transfer.encode_to(&mut buf);
	}
	keccak_256(&buf).into()
}
