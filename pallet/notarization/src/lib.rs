/* Copyright 2021 Centrality Investments Limited
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
#![cfg_attr(not(feature = "std"), no_std)]

//! # Notarization pallet
//!
//! The cross-chain notarization core: this chain periodically records
//! attestations (notarizations) about the state of bridged peer systems and
//! ingests the peers' attestations about this chain.
//!
//! An *earned* notarization is built by the offchain driver at block
//! production cadence: it queries the peer for the best mutually agreed
//! proof root and links the new record to it. An *accepted* notarization
//! originates on the peer, is mirrored into this chain's perspective, and is
//! validated against the locally recomputed proof roots and currency states.
//!
//! Competing records form a DAG of forks; a designated notary set signs
//! confirming or rejecting evidence, and a finalization record advances
//! `pending -> confirmed | rejected` once enough notaries of one polarity
//! have signed. Confirming a record prunes every fork conflicting with it.

#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;
mod impls;
#[cfg(test)]
mod mock;
pub mod rpc_client;
pub mod transition;
pub mod types;
mod weights;
pub use weights::WeightInfo;

use codec::Encode;
use frame_support::{ensure, pallet_prelude::*, transactional};
use frame_system::{
	ensure_none, ensure_root, ensure_signed,
	offchain::{SendTransactionTypes, SubmitTransaction},
	pallet_prelude::*,
};
use log::{debug, error};
pub use pallet::*;
use sp_runtime::{traits::SaturatedConversion, RuntimeAppPublic};
use sp_std::prelude::*;

use crosslink_pallet_common::{CurrencyRegistry, ProofRootSource, ReserveTransferExecutor};
use crosslink_primitives::{
	notarization::{Notarization, OutputRef},
	notary::crypto::{NotaryId, NotarySignature},
	BlockNumber, ChainId,
};

use crate::types::{
	EarnedNotarizationPayload, EvidenceVotePayload, Finalization, NotaryEvidence, PeerRpcApi,
	VotePolarity,
};

/// Prioritize notarization votes above ordinary transactions
const UNSIGNED_TXS_PRIORITY: u64 = 100;
/// The logging target for this pallet
pub(crate) const LOG_TARGET: &str = "notarization";

#[frame_support::pallet]
pub mod pallet {
	use super::*;

	#[pallet::pallet]
	#[pallet::generate_store(pub (super) trait Store)]
	#[pallet::without_storage_info]
	pub struct Pallet<T>(_);

	#[pallet::config]
	pub trait Config:
		frame_system::Config<AccountId = crosslink_primitives::AccountId>
		+ SendTransactionTypes<Call<Self>>
	{
		type Event: From<Event<Self>> + IsType<<Self as frame_system::Config>::Event>;
		/// This chain's own system identity
		#[pallet::constant]
		type HomeChainId: Get<ChainId>;
		/// The notary block period; at most one earned notarization per peer
		/// per period
		#[pallet::constant]
		type NotarizationPeriod: Get<BlockNumber>;
		/// Blocks a notarization must age before notaries may vote on it
		#[pallet::constant]
		type MinBlocksBeforeFinalized: Get<BlockNumber>;
		/// Blocks a pending finalization must mature before it may advance
		#[pallet::constant]
		type FinalizationMaturity: Get<BlockNumber>;
		/// Supplies this chain's height-pinned proof roots
		type ProofRoots: ProofRootSource;
		/// Registry of currency/chain definitions and indexed currency states
		type Currencies: CurrencyRegistry;
		/// Executes reserve transfers during a notarization transition
		type TransferExecutor: ReserveTransferExecutor;
		/// Provides an api for JSON-RPC request/responses to bridged peer systems
		type RpcClient: PeerRpcApi;
		/// The runtime call type.
		type Call: From<Call<Self>>;
		type WeightInfo: WeightInfo;
	}

	/// The peer systems this node notarizes
	#[pallet::storage]
	#[pallet::getter(fn notary_chains)]
	pub type NotaryChains<T> = StorageValue<_, Vec<ChainId>, ValueQuery>;

	/// All known notarization records by output reference
	#[pallet::storage]
	#[pallet::getter(fn notarizations)]
	pub type Notarizations<T> = StorageMap<_, Twox64Concat, OutputRef, Notarization, OptionQuery>;

	/// Per-system block-ordered index of notarization outputs
	#[pallet::storage]
	#[pallet::getter(fn notarization_index)]
	pub type NotarizationIndex<T> = StorageMap<_, Twox64Concat, ChainId, Vec<OutputRef>, ValueQuery>;

	/// The most recent accepted notarization output per peer system
	/// (consumed as input by the next acceptance)
	#[pallet::storage]
	#[pallet::getter(fn latest_accepted)]
	pub type LatestAccepted<T> = StorageMap<_, Twox64Concat, ChainId, OutputRef, OptionQuery>;

	/// Finalization state machines keyed by the notarization they finalize
	#[pallet::storage]
	#[pallet::getter(fn finalizations)]
	pub type Finalizations<T> = StorageMap<_, Twox64Concat, OutputRef, Finalization, OptionQuery>;

	/// Unspent notary evidence per notarization output and polarity
	#[pallet::storage]
	#[pallet::getter(fn evidence_records)]
	pub type EvidenceRecords<T> = StorageDoubleMap<
		_,
		Twox64Concat,
		OutputRef,
		Twox64Concat,
		VotePolarity,
		NotaryEvidence,
		OptionQuery,
	>;

	#[pallet::error]
	pub enum Error<T> {
		/// The peer system is unreachable or returned an invalid answer
		NoNotary,
		/// The local tip moved while the peer was being queried; retry next block
		StaleBlock,
		/// The notary block period for this peer has not elapsed
		Ineligible,
		/// The peer agreed with none of the proof roots we know
		NoMatchingProofRoots,
		/// There is no valid unconfirmed notarization to progress
		NoValidUnconfirmed,
		/// An earned notarization failed validation
		InvalidEarnedNotarization,
		/// A notarization record failed validation
		InvalidNotarization,
		/// A finalization record failed validation or its protocol forbids it
		InvalidFinalization,
		/// The finalization has already reached a terminal state
		AlreadyFinalized,
		/// A second finalization for the same output was submitted
		DuplicateFinalization,
		/// Cited evidence does not carry enough notary signatures
		InsufficientEvidence,
		/// A signer is not in the authorized notary set
		UnauthorizedNotary,
		/// An evidence signature failed verification or was incomplete
		InvalidOrIncompleteSignature,
		/// A transfer application pass reported an invalid export
		InvalidExport,
		/// An attested currency state does not match the local index
		CurrencyStateMismatch,
		/// An attested proof root does not match the locally recomputed root
		ProofRootMismatch,
		/// The record is already in its mirrored orientation
		MirrorAlreadyMirrored,
		/// Some internal operation failed
		Internal,
	}

	#[pallet::event]
	#[pallet::generate_deposit(pub(super) fn deposit_event)]
	pub enum Event<T: Config> {
		/// A peer system was registered for notarization
		NotaryChainAdded { chain_id: ChainId },
		/// A peer system's definition notarization seeded the chain data
		NotaryChainActivated { chain_id: ChainId, output_ref: OutputRef },
		/// An earned notarization was recorded
		EarnedNotarizationSubmitted { chain_id: ChainId, output_ref: OutputRef, height: BlockNumber },
		/// A peer's notarization about this chain was accepted
		NotarizationAccepted { chain_id: ChainId, output_ref: OutputRef, confirmed: bool },
		/// A notary's evidence vote was recorded
		EvidenceVoteRecorded { target: OutputRef, polarity: VotePolarity, signatures: u32 },
		/// A notarization was confirmed by notary evidence
		FinalizationConfirmed { chain_id: ChainId, output_ref: OutputRef },
		/// A notarization was rejected by notary evidence
		FinalizationRejected { chain_id: ChainId, output_ref: OutputRef },
		/// A notarization lost to a confirmed competitor and was pruned
		NotarizationPruned { chain_id: ChainId, output_ref: OutputRef },
	}

	#[pallet::hooks]
	impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
		fn offchain_worker(block_number: T::BlockNumber) {
			// this passes if flag `--validator` set, not necessarily an active notary
			if !sp_io::offchain::is_validator() {
				debug!(target: LOG_TARGET, "💎 not a validator, exiting");
				return
			}
			let now: BlockNumber = block_number.saturated_into();
			Self::do_notarization_ocw(now);
			debug!(target: LOG_TARGET, "💎 exiting off-chain worker");
		}
	}

	#[pallet::call]
	impl<T: Config> Pallet<T> {
		/// Register a peer system for notarization (requires governance)
		#[pallet::weight(T::WeightInfo::add_notary_chain())]
		pub fn add_notary_chain(origin: OriginFor<T>, chain_id: ChainId) -> DispatchResult {
			ensure_root(origin)?;
			NotaryChains::<T>::try_mutate(|chains| -> DispatchResult {
				ensure!(!chains.contains(&chain_id), Error::<T>::InvalidNotarization);
				chains.push(chain_id);
				Ok(())
			})?;
			Self::deposit_event(Event::<T>::NotaryChainAdded { chain_id });
			Ok(())
		}

		/// Seed a peer system's notarization thread with its definition
		/// record (requires governance)
		///
		/// Definition notarizations are confirmed by definition and become
		/// the root the fork DAG builds from.
		#[pallet::weight(T::WeightInfo::activate_notary_chain())]
		pub fn activate_notary_chain(
			origin: OriginFor<T>,
			chain_id: ChainId,
			definition: Notarization,
		) -> DispatchResult {
			ensure_root(origin)?;
			ensure!(
				definition.is_definition() &&
					definition.is_valid() &&
					definition.currency_id == chain_id,
				Error::<T>::InvalidNotarization
			);
			ensure!(
				T::Currencies::currency_definition(&chain_id).is_some(),
				Error::<T>::InvalidNotarization
			);
			ensure!(
				NotarizationIndex::<T>::get(chain_id).is_empty(),
				Error::<T>::DuplicateFinalization
			);
			// a definition record roots its own thread
			ensure!(definition.prev_notarization.is_none(), Error::<T>::InvalidNotarization);
			if !NotaryChains::<T>::get().contains(&chain_id) {
				NotaryChains::<T>::append(chain_id);
				Self::deposit_event(Event::<T>::NotaryChainAdded { chain_id });
			}

			let output_ref = Self::next_output_ref(&definition.hash());
			let now: BlockNumber =
				<frame_system::Pallet<T>>::block_number().saturated_into();
			let mut finalization = Finalization::pending(
				types::FinalizationKind::Notarization,
				chain_id,
				output_ref,
				now,
			);
			finalization.confirm().map_err(|_| Error::<T>::Internal)?;

			Notarizations::<T>::insert(output_ref, &definition);
			NotarizationIndex::<T>::append(chain_id, output_ref);
			LatestAccepted::<T>::insert(chain_id, output_ref);
			Finalizations::<T>::insert(output_ref, finalization);
			Self::deposit_event(Event::<T>::NotaryChainActivated { chain_id, output_ref });
			Ok(())
		}

		/// Validate and ingest a peer's earned notarization about this
		/// chain, together with the notary evidence collected on the peer
		///
		/// The record is mirrored into this chain's perspective, checked
		/// against locally recomputed proof roots and currency states, and
		/// chained onto the latest accepted notarization. A finalization is
		/// emitted unless the currency's protocol delegates authority to
		/// the notary chain itself; it is born confirmed only when every
		/// authorized notary signed.
		#[pallet::weight(T::WeightInfo::submit_accepted_notarization())]
		#[transactional]
		pub fn submit_accepted_notarization(
			origin: OriginFor<T>,
			chain_id: ChainId,
			earned: Notarization,
			evidence: NotaryEvidence,
		) -> DispatchResult {
			let _ = ensure_signed(origin)?;
			Self::do_accept_notarization(chain_id, earned, evidence)
		}

		/// Internal only
		/// The offchain driver submits earned notarizations built from the
		/// peer's `getbestproofroot` answer
		#[pallet::weight(T::WeightInfo::submit_earned_notarization())]
		#[transactional]
		pub fn submit_earned_notarization(
			origin: OriginFor<T>,
			payload: EarnedNotarizationPayload,
			_signature: <NotaryId as RuntimeAppPublic>::Signature,
		) -> DispatchResult {
			let _ = ensure_none(origin)?;
			// signature verified by `validate_unsigned`
			let now: BlockNumber = <frame_system::Pallet<T>>::block_number().saturated_into();
			// the driver queried the peer against a snapshot of the tip; if
			// the chain advanced since, the answer no longer applies
			ensure!(
				payload.observed_height.saturating_add(1) == now,
				Error::<T>::StaleBlock
			);
			Self::do_record_earned_notarization(payload, now)
		}

		/// Internal only
		/// Notaries submit evidence votes for pending notarizations
		#[pallet::weight(T::WeightInfo::submit_evidence_vote())]
		#[transactional]
		pub fn submit_evidence_vote(
			origin: OriginFor<T>,
			payload: EvidenceVotePayload,
			_signature: <NotaryId as RuntimeAppPublic>::Signature,
		) -> DispatchResult {
			let _ = ensure_none(origin)?;
			// transport signature verified by `validate_unsigned`; the
			// evidence signature itself is verified against the target below
			let now: BlockNumber = <frame_system::Pallet<T>>::block_number().saturated_into();
			// the voting pass queried the peer against a snapshot of the tip;
			// if the chain advanced since, the answer no longer applies and
			// the next block's pass retries
			ensure!(
				payload.observed_height.saturating_add(1) == now,
				Error::<T>::StaleBlock
			);
			Self::do_record_evidence_vote(payload, now)
		}
	}

	#[pallet::validate_unsigned]
	impl<T: Config> ValidateUnsigned for Pallet<T> {
		type Call = Call<T>;

		fn validate_unsigned(_source: TransactionSource, call: &Self::Call) -> TransactionValidity {
			match call {
				Call::submit_earned_notarization { payload, signature } => {
					let Some(notary) = Self::authorized_notary(
						&payload.chain_id,
						payload.authority_index,
					) else {
						return InvalidTransaction::BadProof.into()
					};
					if !notary.verify(&payload.encode(), signature) {
						return InvalidTransaction::BadProof.into()
					}
					ValidTransaction::with_tag_prefix("notarization")
						.priority(UNSIGNED_TXS_PRIORITY)
						.and_provides((b"earned", payload.chain_id, payload.observed_height))
						.longevity(3)
						.propagate(true)
						.build()
				},
				Call::submit_evidence_vote { payload, signature } => {
					let Some(notary) = Self::authorized_notary(
						&payload.chain_id,
						payload.authority_index,
					) else {
						return InvalidTransaction::BadProof.into()
					};
					// a vote must not be a duplicate/equivocation
					if EvidenceRecords::<T>::get(payload.target, payload.polarity)
						.map_or(false, |evidence| evidence.signatures.contains(&notary))
					{
						error!(
							target: LOG_TARGET,
							"💎 received equivocation from: {:?} on {:?}",
							notary,
							payload.target
						);
						return InvalidTransaction::BadProof.into()
					}
					if !notary.verify(&payload.encode(), signature) {
						return InvalidTransaction::BadProof.into()
					}
					ValidTransaction::with_tag_prefix("notarization")
						.priority(UNSIGNED_TXS_PRIORITY)
						// 'provides' must be unique for each submission on the
						// network (i.e. unique per target, polarity and notary)
						.and_provides((
							b"evidence",
							payload.target,
							payload.polarity,
							payload.authority_index,
						))
						.longevity(3)
						.propagate(true)
						.build()
				},
				_ => InvalidTransaction::Call.into(),
			}
		}
	}
}

impl<T: Config> Pallet<T> {
	/// Resolve `authority_index` into the notary set registered for
	/// `chain_id`, if the index is in range
	pub(crate) fn authorized_notary(
		chain_id: &ChainId,
		authority_index: crosslink_primitives::notary::AuthorityIndex,
	) -> Option<NotaryId> {
		T::Currencies::currency_definition(chain_id)
			.and_then(|def| def.notaries.get(authority_index as usize).cloned())
	}

	/// Send a signed unsigned extrinsic carrying a notary payload
	pub(crate) fn offchain_submit_call(call: Call<T>) -> Result<(), crosslink_primitives::OffchainErr> {
		SubmitTransaction::<T, Call<T>>::submit_unsigned_transaction(call.into())
			.map_err(|_| crosslink_primitives::OffchainErr::SubmitTransaction)
	}

	/// Sign `payload` with `key` for unsigned transport
	pub(crate) fn sign_payload<P: Encode>(
		key: &NotaryId,
		payload: &P,
	) -> Result<NotarySignature, crosslink_primitives::OffchainErr> {
		key.sign(&payload.encode())
			.ok_or(crosslink_primitives::OffchainErr::SubmitTransaction)
	}
}
