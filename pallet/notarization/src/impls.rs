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

//! Chain-data reconstruction, the finalization protocol, acceptance
//! validation, and the offchain notary driver

use codec::Encode;
use frame_support::ensure;
use log::{debug, error, info, trace};
use sp_core::{H256, U256};
use sp_io::hashing::keccak_256;
use sp_runtime::{traits::SaturatedConversion, DispatchError, DispatchResult, RuntimeAppPublic};
use sp_std::{
	collections::{btree_map::BTreeMap, btree_set::BTreeSet},
	prelude::*,
};

use crosslink_pallet_common::{CurrencyRegistry, ProofRootSource};
use crosslink_primitives::{
	notarization::{
		CurrencyDefinition, MirrorError, Notarization, NotarizationProtocol, OutputRef,
		ProofRootKind,
	},
	notary::{crypto::NotaryId, AuthorityIndex},
	BlockNumber, ChainId, OffchainErr,
};

use crate::{
	types::{
		vote_digest, verify_vote_signature, EarnedNotarizationPayload, EvidenceVotePayload,
		Finalization, FinalizationKind, NotarizationChainData, NotaryEvidence, PeerRpcApi,
		VotePolarity,
	},
	Call, Config, Error, Event, EvidenceRecords, Finalizations, LatestAccepted, NotaryChains,
	NotarizationIndex, Notarizations, Pallet, LOG_TARGET,
};

impl<T: Config> Pallet<T> {
	/// Rebuild the notarization DAG for `chain_id` from the chain index.
	///
	/// `vtx` carries every indexed record in block order; forks are
	/// reconstructed by walking each record's `prev_notarization` from the
	/// confirmed root. Records whose parent cannot be resolved are logged
	/// and skipped. Equal-power forks tie-break on the lower fork index.
	pub fn notarization_data(chain_id: ChainId) -> NotarizationChainData {
		let refs = NotarizationIndex::<T>::get(chain_id);
		let mut vtx: Vec<(OutputRef, Notarization)> = Vec::with_capacity(refs.len());
		for output_ref in refs {
			match Notarizations::<T>::get(output_ref) {
				Some(record) => vtx.push((output_ref, record)),
				// indexed but missing, not fatal
				None => {
					error!(
						target: LOG_TARGET,
						"💎 indexed notarization missing: {:?}", output_ref
					);
				},
			}
		}
		if vtx.is_empty() {
			return NotarizationChainData::default()
		}

		// the confirmed tip is the newest record with confirmed finalization
		let mut last_confirmed: Option<u32> = None;
		for (i, (output_ref, _)) in vtx.iter().enumerate().rev() {
			if Finalizations::<T>::get(output_ref).map_or(false, |f| f.is_confirmed()) {
				last_confirmed = Some(i as u32);
				break
			}
		}

		let mut forks: Vec<Vec<u32>> = Vec::new();
		if let Some(root) = last_confirmed {
			forks.push(vec![root]);
			let ref_index: BTreeMap<OutputRef, u32> =
				vtx.iter().enumerate().map(|(i, (r, _))| (*r, i as u32)).collect();
			for i in (root as usize + 1)..vtx.len() {
				let (_, record) = &vtx[i];
				let Some(parent_ref) = record.prev_notarization else {
					debug!(target: LOG_TARGET, "💎 unparented record at {:?}, skipping", i);
					continue
				};
				let Some(parent_idx) = ref_index.get(&parent_ref).copied() else {
					debug!(target: LOG_TARGET, "💎 unresolvable parent {:?}, skipping", parent_ref);
					continue
				};
				if record.hash_prev_notarization != vtx[parent_idx as usize].1.hash() {
					debug!(target: LOG_TARGET, "💎 parent hash mismatch at {:?}, skipping", i);
					continue
				}
				if let Some(fork) = forks.iter_mut().find(|f| f.last() == Some(&parent_idx)) {
					// extends an existing fork tip
					fork.push(i as u32);
				} else if let Some(fork) =
					forks.iter().find(|f| f.contains(&parent_idx)).cloned()
				{
					// branches mid-fork: copy the prefix up to the parent
					let pos = fork.iter().position(|x| *x == parent_idx).unwrap_or_default();
					let mut branch = fork[..=pos].to_vec();
					branch.push(i as u32);
					forks.push(branch);
				} else {
					// conflicts with the confirmed tip
					debug!(target: LOG_TARGET, "💎 record at {:?} conflicts with confirmed tip", i);
				}
			}
		}

		// heaviest attested peer power wins; a strict comparison keeps the
		// lower fork index on ties
		let mut best_chain = 0_u32;
		let mut best_power = U256::zero();
		for (fork_idx, fork) in forks.iter().enumerate() {
			let power = fork
				.last()
				.and_then(|i| vtx.get(*i as usize))
				.and_then(|(_, record)| record.proof_roots.get(&chain_id))
				.map(|root| root.compact_power)
				.unwrap_or_default();
			if power > best_power {
				best_power = power;
				best_chain = fork_idx as u32;
			}
		}

		NotarizationChainData { vtx, forks, last_confirmed, best_chain }
	}

	/// The union of unspent evidence records for a notarization output,
	/// both polarities
	pub fn unspent_notary_evidence(target: &OutputRef) -> Vec<(OutputRef, NotaryEvidence)> {
		let mut unspent = Vec::new();
		for polarity in [VotePolarity::Confirm, VotePolarity::Reject] {
			if let Some(evidence) = EvidenceRecords::<T>::get(target, polarity) {
				unspent.push((Self::evidence_output_ref(target, polarity), evidence));
			}
		}
		unspent
	}

	/// Mint a reference for a record created by the current extrinsic
	pub(crate) fn next_output_ref(payload_hash: &H256) -> OutputRef {
		let block: BlockNumber = <frame_system::Pallet<T>>::block_number().saturated_into();
		let extrinsic_index = <frame_system::Pallet<T>>::extrinsic_index().unwrap_or_default();
		let txid = keccak_256(&(block, extrinsic_index, payload_hash).encode());
		OutputRef::new(txid.into(), 0)
	}

	/// The reference under which evidence for `target` of `polarity` lives
	pub(crate) fn evidence_output_ref(target: &OutputRef, polarity: VotePolarity) -> OutputRef {
		let txid = keccak_256(&(target, polarity).encode());
		let index = match polarity {
			VotePolarity::Confirm => 1,
			VotePolarity::Reject => 2,
		};
		OutputRef::new(txid.into(), index)
	}

	/// Record an earned notarization submitted by the offchain driver
	pub(crate) fn do_record_earned_notarization(
		payload: EarnedNotarizationPayload,
		now: BlockNumber,
	) -> DispatchResult {
		let EarnedNotarizationPayload { chain_id, notarization, .. } = payload;
		ensure!(NotaryChains::<T>::get().contains(&chain_id), Error::<T>::InvalidEarnedNotarization);
		let definition = T::Currencies::currency_definition(&chain_id)
			.ok_or(Error::<T>::InvalidEarnedNotarization)?;
		ensure!(notarization.is_valid(), Error::<T>::InvalidEarnedNotarization);
		ensure!(notarization.currency_id == chain_id, Error::<T>::InvalidEarnedNotarization);
		ensure!(notarization.notarization_height == now, Error::<T>::InvalidEarnedNotarization);
		ensure!(
			notarization.proof_roots.contains_key(&chain_id),
			Error::<T>::InvalidEarnedNotarization
		);

		// one earned notarization per notary block period
		let data = Self::notarization_data(chain_id);
		let prior = data.best_tip().ok_or(Error::<T>::NoValidUnconfirmed)?;
		let period = T::NotarizationPeriod::get().max(1);
		ensure!(
			now / period > prior.1.notarization_height / period,
			Error::<T>::Ineligible
		);

		// the new record must chain onto a known prior record
		let parent_ref =
			notarization.prev_notarization.ok_or(Error::<T>::InvalidEarnedNotarization)?;
		let parent =
			Notarizations::<T>::get(parent_ref).ok_or(Error::<T>::InvalidEarnedNotarization)?;
		ensure!(
			notarization.hash_prev_notarization == parent.hash() &&
				notarization.prev_height == parent.notarization_height,
			Error::<T>::InvalidEarnedNotarization
		);

		let output_ref = Self::next_output_ref(&notarization.hash());
		Notarizations::<T>::insert(output_ref, &notarization);
		NotarizationIndex::<T>::append(chain_id, output_ref);
		// a finalization accompanies the record unless the notary chain
		// itself is authoritative for this currency
		if definition.notarization_protocol != NotarizationProtocol::NotaryChainId {
			let finalization = Finalization::pending(
				FinalizationKind::Notarization,
				chain_id,
				output_ref,
				now.saturating_add(T::FinalizationMaturity::get()),
			);
			Finalizations::<T>::insert(output_ref, finalization);
		}
		info!(
			target: LOG_TARGET,
			"💎 earned notarization recorded for {:?} at height {:?}", chain_id, now
		);
		Self::deposit_event(Event::<T>::EarnedNotarizationSubmitted {
			chain_id,
			output_ref,
			height: now,
		});
		Ok(())
	}

	/// Record one notary's evidence vote and advance the target's
	/// finalization if the vote reaches the notary threshold
	pub(crate) fn do_record_evidence_vote(
		payload: EvidenceVotePayload,
		now: BlockNumber,
	) -> DispatchResult {
		let EvidenceVotePayload { chain_id, target, polarity, authority_index, evidence_signature, .. } =
			payload;
		let record = Notarizations::<T>::get(target).ok_or(Error::<T>::InvalidNotarization)?;
		ensure!(record.currency_id == chain_id, Error::<T>::InvalidNotarization);
		let definition =
			T::Currencies::currency_definition(&chain_id).ok_or(Error::<T>::InvalidNotarization)?;
		match definition.notarization_protocol {
			NotarizationProtocol::NotaryConfirm => {},
			// auto finalization is unimplemented outside test mode and the
			// notary-chain protocol carries no finalizations at all
			NotarizationProtocol::Auto | NotarizationProtocol::NotaryChainId =>
				return Err(Error::<T>::InvalidFinalization.into()),
		}

		let mut finalization =
			Finalizations::<T>::get(target).ok_or(Error::<T>::InvalidFinalization)?;
		ensure!(finalization.is_pending(), Error::<T>::AlreadyFinalized);
		ensure!(
			now >= record.notarization_height.saturating_add(T::MinBlocksBeforeFinalized::get()),
			Error::<T>::Ineligible
		);

		let notary = definition
			.notaries
			.get(authority_index as usize)
			.ok_or(Error::<T>::UnauthorizedNotary)?;
		ensure!(
			verify_vote_signature(
				notary,
				&evidence_signature,
				polarity,
				&record.currency_id,
				record.notarization_height,
				&record.encode(),
			),
			Error::<T>::InvalidOrIncompleteSignature
		);

		let mut evidence = EvidenceRecords::<T>::get(target, polarity)
			.unwrap_or_else(|| NotaryEvidence::new(chain_id, target, polarity));
		if !evidence.insert_signature(notary.clone(), evidence_signature, polarity) {
			// already recorded, nothing to do
			return Ok(())
		}
		let signatures = evidence.signature_count() as u32;
		EvidenceRecords::<T>::insert(target, polarity, &evidence);
		Self::deposit_event(Event::<T>::EvidenceVoteRecorded { target, polarity, signatures });

		// a pending finalization may only advance once matured
		if now < finalization.minimum_height {
			return Ok(())
		}
		if signatures < definition.min_notaries_confirm {
			return Ok(())
		}

		let evidence_ref = Self::evidence_output_ref(&target, polarity);
		finalization.evidence_outputs = vec![evidence_ref];
		match polarity {
			VotePolarity::Confirm => {
				finalization.confirm().map_err(|_| Error::<T>::AlreadyFinalized)?;
				Finalizations::<T>::insert(target, finalization);
				Self::confirm_notarization(chain_id, &target);
				Self::deposit_event(Event::<T>::FinalizationConfirmed {
					chain_id,
					output_ref: target,
				});
			},
			VotePolarity::Reject => {
				finalization.reject().map_err(|_| Error::<T>::AlreadyFinalized)?;
				Finalizations::<T>::insert(target, finalization);
				Self::reject_notarization(chain_id, &target);
				Self::deposit_event(Event::<T>::FinalizationRejected {
					chain_id,
					output_ref: target,
				});
			},
		}
		Ok(())
	}

	/// A record was confirmed: prune every fork that conflicts with it.
	/// Kept records are the confirmed record, its ancestors, and its
	/// descendants; the index is block-ordered so parents precede children.
	pub(crate) fn confirm_notarization(chain_id: ChainId, target: &OutputRef) {
		let refs = NotarizationIndex::<T>::get(chain_id);

		// the confirmed record and its ancestry
		let mut ancestors: BTreeSet<OutputRef> = BTreeSet::new();
		let mut cursor = Some(*target);
		while let Some(output_ref) = cursor {
			if !ancestors.insert(output_ref) {
				break
			}
			cursor = Notarizations::<T>::get(output_ref).and_then(|n| n.prev_notarization);
		}
		// descendants of the confirmed record only; siblings on other forks
		// lose. The index is block-ordered so parents precede children.
		let mut descendants: BTreeSet<OutputRef> = BTreeSet::new();
		descendants.insert(*target);
		for output_ref in refs.iter() {
			if descendants.contains(output_ref) {
				continue
			}
			if let Some(record) = Notarizations::<T>::get(output_ref) {
				if record.prev_notarization.map_or(false, |parent| descendants.contains(&parent)) {
					descendants.insert(*output_ref);
				}
			}
		}
		let mut keep = ancestors;
		keep.extend(descendants);

		let mut kept_refs = Vec::with_capacity(keep.len());
		for output_ref in refs {
			if keep.contains(&output_ref) {
				kept_refs.push(output_ref);
				continue
			}
			Self::discard_record(chain_id, &output_ref);
		}
		if LatestAccepted::<T>::get(chain_id).map_or(false, |r| !keep.contains(&r)) {
			LatestAccepted::<T>::insert(chain_id, *target);
		}
		NotarizationIndex::<T>::insert(chain_id, kept_refs);
	}

	/// A record was rejected: drop it and its descendants from the index.
	/// The terminal finalization stays behind as the record of the
	/// rejection.
	pub(crate) fn reject_notarization(chain_id: ChainId, target: &OutputRef) {
		let refs = NotarizationIndex::<T>::get(chain_id);
		let mut dropped: BTreeSet<OutputRef> = BTreeSet::new();
		dropped.insert(*target);
		for output_ref in refs.iter() {
			if dropped.contains(output_ref) {
				continue
			}
			if let Some(record) = Notarizations::<T>::get(output_ref) {
				if record.prev_notarization.map_or(false, |parent| dropped.contains(&parent)) {
					dropped.insert(*output_ref);
				}
			}
		}
		let mut kept_refs = Vec::with_capacity(refs.len() - dropped.len().min(refs.len()));
		for output_ref in refs {
			if !dropped.contains(&output_ref) {
				kept_refs.push(output_ref);
				continue
			}
			if output_ref != *target {
				Self::discard_record(chain_id, &output_ref);
			} else {
				Self::deposit_event(Event::<T>::NotarizationPruned { chain_id, output_ref });
			}
		}
		if LatestAccepted::<T>::get(chain_id).map_or(false, |r| dropped.contains(&r)) {
			if let Some(tip) = kept_refs.last() {
				LatestAccepted::<T>::insert(chain_id, *tip);
			}
		}
		NotarizationIndex::<T>::insert(chain_id, kept_refs);
	}

	/// Remove a losing record together with its finalization and evidence
	fn discard_record(chain_id: ChainId, output_ref: &OutputRef) {
		Notarizations::<T>::remove(output_ref);
		Finalizations::<T>::remove(output_ref);
		for polarity in [VotePolarity::Confirm, VotePolarity::Reject] {
			EvidenceRecords::<T>::remove(output_ref, polarity);
		}
		Self::deposit_event(Event::<T>::NotarizationPruned { chain_id, output_ref: *output_ref });
	}

	/// Validate and wrap a peer's earned notarization as accepted
	pub(crate) fn do_accept_notarization(
		chain_id: ChainId,
		earned: Notarization,
		evidence: NotaryEvidence,
	) -> DispatchResult {
		let home = T::HomeChainId::get();
		ensure!(NotaryChains::<T>::get().contains(&chain_id), Error::<T>::InvalidNotarization);
		let definition =
			T::Currencies::currency_definition(&chain_id).ok_or(Error::<T>::InvalidNotarization)?;
		ensure!(earned.is_valid(), Error::<T>::InvalidEarnedNotarization);
		// the peer's earned record attests this chain
		ensure!(earned.currency_id == home, Error::<T>::InvalidEarnedNotarization);

		// evidence must carry at least one authorized confirming signature,
		// each verifying over the record as the notaries signed it
		ensure!(
			evidence.is_confirming() && evidence.signature_count() >= 1,
			Error::<T>::InsufficientEvidence
		);
		let earned_bytes = earned.encode();
		for (notary, signature) in evidence.signatures.signatures() {
			ensure!(definition.notaries.contains(notary), Error::<T>::UnauthorizedNotary);
			ensure!(
				verify_vote_signature(
					notary,
					signature,
					VotePolarity::Confirm,
					&earned.currency_id,
					earned.notarization_height,
					&earned_bytes,
				),
				Error::<T>::InvalidOrIncompleteSignature
			);
		}

		// the attested home root must strictly advance the confirmed tip
		let data = Self::notarization_data(chain_id);
		let confirmed = data.confirmed().ok_or(Error::<T>::NoValidUnconfirmed)?;
		let attested_root =
			earned.proof_roots.get(&home).ok_or(Error::<T>::InvalidEarnedNotarization)?;
		let confirmed_height =
			confirmed.1.proof_roots.get(&home).map(|r| r.root_height).unwrap_or_default();
		ensure!(
			attested_root.root_height > confirmed_height,
			Error::<T>::InvalidEarnedNotarization
		);

		// and must equal the locally recomputed root at that height
		let local_root = T::ProofRoots::proof_root_at(attested_root.root_height)
			.ok_or(Error::<T>::ProofRootMismatch)?;
		ensure!(
			attested_root.block_hash == local_root.block_hash &&
				attested_root.state_root == local_root.state_root &&
				matches!(attested_root.kind, ProofRootKind::Native | ProofRootKind::Ethereum),
			Error::<T>::ProofRootMismatch
		);

		// home-chain currency states are verified against the local index;
		// foreign currencies are the peer's to attest
		for (currency, state) in
			earned.currency_states.iter().chain(sp_std::iter::once((&home, &earned.currency_state)))
		{
			let Some(currency_def) = T::Currencies::currency_definition(currency) else {
				continue
			};
			if currency_def.system_id != home {
				continue
			}
			let expected = T::Currencies::currency_state_at(currency, attested_root.root_height)
				.ok_or(Error::<T>::CurrencyStateMismatch)?;
			ensure!(*state == expected, Error::<T>::CurrencyStateMismatch);
		}

		// proof roots for third systems must be registered here and must
		// not be tokens of this chain
		for (system, _root) in earned.proof_roots.iter() {
			if *system == chain_id || *system == home {
				continue
			}
			ensure!(
				T::Currencies::currency_definition(system).is_some(),
				Error::<T>::InvalidNotarization
			);
			ensure!(!T::Currencies::is_local_token(system), Error::<T>::InvalidNotarization);
		}

		// flip perspective; a record that was already mirrored is refused
		let mirrored = earned.into_mirror(chain_id).map_err(|err| match err {
			MirrorError::AlreadyMirrored => Error::<T>::MirrorAlreadyMirrored,
			MirrorError::MissingCounterpartState => Error::<T>::InvalidNotarization,
		})?;
		let mut accepted = mirrored.into_inner();

		// consume the last unspent accepted notarization as this record's input
		let latest_ref = LatestAccepted::<T>::get(chain_id).ok_or(Error::<T>::NoValidUnconfirmed)?;
		let latest =
			Notarizations::<T>::get(latest_ref).ok_or(Error::<T>::NoValidUnconfirmed)?;
		let now: BlockNumber = <frame_system::Pallet<T>>::block_number().saturated_into();
		accepted.prev_notarization = Some(latest_ref);
		accepted.prev_height = latest.notarization_height;
		accepted.hash_prev_notarization = latest.hash();
		accepted.notarization_height = now;
		accepted.clear_flag(Notarization::FLAG_DEFINITION);

		let output_ref = Self::next_output_ref(&accepted.hash());
		Notarizations::<T>::insert(output_ref, &accepted);
		NotarizationIndex::<T>::append(chain_id, output_ref);
		LatestAccepted::<T>::insert(chain_id, output_ref);

		// re-home the evidence onto the new output
		let mut stored_evidence = evidence;
		stored_evidence.system_id = chain_id;
		stored_evidence.output_ref = output_ref;
		let signatures = stored_evidence.signature_count();
		let evidence_ref = Self::evidence_output_ref(&output_ref, VotePolarity::Confirm);
		EvidenceRecords::<T>::insert(output_ref, VotePolarity::Confirm, &stored_evidence);

		// a finalization accompanies the record unless the notary chain
		// itself is authoritative for this currency
		let mut confirmed_now = false;
		if definition.notarization_protocol != NotarizationProtocol::NotaryChainId {
			ensure!(
				!Finalizations::<T>::contains_key(output_ref),
				Error::<T>::DuplicateFinalization
			);
			let mut finalization = Finalization::pending(
				FinalizationKind::Notarization,
				chain_id,
				output_ref,
				now.saturating_add(T::FinalizationMaturity::get()),
			);
			// all notaries signing makes the acceptance final immediately
			if signatures >= definition.notaries.len() && !definition.notaries.is_empty() {
				finalization.confirm().map_err(|_| Error::<T>::Internal)?;
				finalization.evidence_outputs = vec![evidence_ref];
				confirmed_now = true;
			}
			Finalizations::<T>::insert(output_ref, finalization);
		}
		if confirmed_now {
			Self::confirm_notarization(chain_id, &output_ref);
			Self::deposit_event(Event::<T>::FinalizationConfirmed { chain_id, output_ref });
		}
		info!(
			target: LOG_TARGET,
			"💎 accepted notarization for {:?}: {:?} signatures, confirmed: {:?}",
			chain_id,
			signatures,
			confirmed_now
		);
		Self::deposit_event(Event::<T>::NotarizationAccepted {
			chain_id,
			output_ref,
			confirmed: confirmed_now,
		});
		Ok(())
	}

	/// Run both offchain passes for every registered peer system
	pub(crate) fn do_notarization_ocw(now: BlockNumber) {
		for chain_id in NotaryChains::<T>::get() {
			if let Err(err) = Self::ocw_earned_notarization(chain_id, now) {
				debug!(
					target: LOG_TARGET,
					"💎 earned notarization pass for {:?} skipped: {:?}", chain_id, err
				);
			}
			if let Err(err) = Self::ocw_confirm_or_reject(chain_id, now) {
				debug!(
					target: LOG_TARGET,
					"💎 confirm/reject pass for {:?} skipped: {:?}", chain_id, err
				);
			}
		}
	}

	/// Collect the peer's proof roots from every record in the chain data,
	/// remembering which `vtx` entry each came from
	fn collect_peer_roots(
		data: &NotarizationChainData,
		chain_id: &ChainId,
	) -> (Vec<crosslink_primitives::notarization::ProofRoot>, Vec<usize>) {
		let mut roots = Vec::new();
		let mut sources = Vec::new();
		for (i, (_, record)) in data.vtx.iter().enumerate() {
			if let Some(root) = record.proof_roots.get(chain_id) {
				roots.push(root.clone());
				sources.push(i);
			}
		}
		(roots, sources)
	}

	/// Check the node's local keystore for keys in the notary set
	/// Returns each controlled key with its index in the set
	pub(crate) fn find_active_notary_keys(
		notaries: &[NotaryId],
	) -> Vec<(NotaryId, AuthorityIndex)> {
		let local_keys = NotaryId::all();
		if local_keys.is_empty() {
			return Vec::new()
		}
		let mut active: Vec<(NotaryId, AuthorityIndex)> = Vec::new();
		for key in local_keys {
			if let Some(index) = notaries.iter().position(|k| k == &key) {
				active.push((key, index as AuthorityIndex));
			}
		}
		active.sort_by_key(|(_, index)| *index);
		active
	}

	/// Build and submit an earned notarization for `chain_id` if this node
	/// controls a notary key and the notary block period has elapsed
	pub(crate) fn ocw_earned_notarization(
		chain_id: ChainId,
		now: BlockNumber,
	) -> Result<(), OffchainErr> {
		let definition =
			T::Currencies::currency_definition(&chain_id).ok_or(OffchainErr::Internal)?;
		let keys = Self::find_active_notary_keys(&definition.notaries);
		let (active_key, authority_index) =
			keys.first().cloned().ok_or(OffchainErr::NotANotary)?;

		let data = Self::notarization_data(chain_id);
		let confirmed_idx = data.last_confirmed.ok_or(OffchainErr::NoValidUnconfirmed)?;
		let prior = data.best_tip().ok_or(OffchainErr::NoValidUnconfirmed)?;

		// cheap local gate before going to the network: the record lands at
		// `now + 1`, which must open a new notary block period
		let period = T::NotarizationPeriod::get().max(1);
		if (now + 1) / period <= prior.1.notarization_height / period {
			return Err(OffchainErr::TooEarly)
		}

		let (proofroots, sources) = Self::collect_peer_roots(&data, &chain_id);
		if proofroots.is_empty() {
			return Err(OffchainErr::NoValidUnconfirmed)
		}
		let lastconfirmed = data.vtx[confirmed_idx as usize]
			.1
			.proof_roots
			.get(&chain_id)
			.map(|root| root.root_height)
			.unwrap_or_default();

		// suspension point: the peer is queried with no locks held; the
		// submitted payload pins `now` so a tip change surfaces as
		// stale-block on execution
		let response = T::RpcClient::get_best_proof_root(&chain_id, proofroots, lastconfirmed)
			.map_err(|err| {
				error!(target: LOG_TARGET, "💎 getbestproofroot failed: {:?}", err);
				OffchainErr::NoNotary
			})?;
		if response.bestproofrootindex < 0 {
			return Err(OffchainErr::NoMatchingProofRoots)
		}
		let agreed_vtx = sources
			.get(response.bestproofrootindex as usize)
			.copied()
			.ok_or(OffchainErr::NoNotary)?;
		let latest_root = response.latestproofroot.ok_or(OffchainErr::NoMatchingProofRoots)?;
		if latest_root.chain_id != chain_id {
			return Err(OffchainErr::NoNotary)
		}

		// link the new record to the agreed prior record, which may trail
		// the local best tip
		let (agreed_ref, agreed_record) = &data.vtx[agreed_vtx];
		let mut notarization = agreed_record.clone();
		notarization.version = Notarization::VERSION_CURRENT;
		notarization.clear_flag(Notarization::FLAG_DEFINITION);
		notarization.prev_notarization = Some(*agreed_ref);
		notarization.prev_height = agreed_record.notarization_height;
		notarization.notarization_height = now + 1;
		notarization.hash_prev_notarization = agreed_record.hash();
		notarization.proof_roots.insert(chain_id, latest_root);

		// our own root rides along so the peer can validate in turn
		let home = T::HomeChainId::get();
		let home_root = T::ProofRoots::proof_root_at(T::ProofRoots::tip_height())
			.ok_or(OffchainErr::Internal)?;
		notarization.proof_roots.insert(home, home_root);

		// accept the peer's currency states for currencies registered here
		// and hosted by the peer; everything else is ignored
		for state in response.currencystates {
			let Some(state_def) = T::Currencies::currency_definition(&state.currency_id) else {
				continue
			};
			if state_def.system_id != chain_id {
				continue
			}
			if state.currency_id == chain_id {
				notarization.currency_state = state;
			} else {
				notarization.currency_states.insert(state.currency_id, state);
			}
		}

		let payload = EarnedNotarizationPayload {
			chain_id,
			observed_height: now,
			authority_index,
			notarization,
		};
		let signature = Self::sign_payload(&active_key, &payload)?;
		Self::offchain_submit_call(Call::submit_earned_notarization { payload, signature })?;
		info!(target: LOG_TARGET, "💎 sent earned notarization for {:?}", chain_id);
		Ok(())
	}

	/// Vote to confirm or reject the newest eligible pending notarization
	/// with every controlled notary identity that has not signed yet
	pub(crate) fn ocw_confirm_or_reject(
		chain_id: ChainId,
		now: BlockNumber,
	) -> Result<(), OffchainErr> {
		let definition =
			T::Currencies::currency_definition(&chain_id).ok_or(OffchainErr::Internal)?;
		if definition.notarization_protocol != NotarizationProtocol::NotaryConfirm {
			return Ok(())
		}
		let keys = Self::find_active_notary_keys(&definition.notaries);
		if keys.is_empty() {
			return Err(OffchainErr::NotANotary)
		}

		let data = Self::notarization_data(chain_id);
		let confirmed_idx = data.last_confirmed.ok_or(OffchainErr::NoValidUnconfirmed)?;
		let (proofroots, _sources) = Self::collect_peer_roots(&data, &chain_id);
		if proofroots.is_empty() {
			return Err(OffchainErr::NoValidUnconfirmed)
		}
		let lastconfirmed = data.vtx[confirmed_idx as usize]
			.1
			.proof_roots
			.get(&chain_id)
			.map(|root| root.root_height)
			.unwrap_or_default();
		let response = T::RpcClient::get_best_proof_root(&chain_id, proofroots, lastconfirmed)
			.map_err(|_| OffchainErr::NoNotary)?;

		// walk the canonical fork newest-first for the one record to vote on
		let fork = data.best_fork().ok_or(OffchainErr::NoValidUnconfirmed)?;
		let mut candidate: Option<(OutputRef, Notarization, VotePolarity)> = None;
		for idx in fork.iter().rev() {
			if Some(*idx) == data.last_confirmed {
				continue
			}
			let (output_ref, record) = &data.vtx[*idx as usize];
			// votes open only once the record has aged past the holdoff
			if record
				.notarization_height
				.saturating_add(T::MinBlocksBeforeFinalized::get()) >
				now
			{
				continue
			}
			let Some(finalization) = Finalizations::<T>::get(output_ref) else { continue };
			if !finalization.is_pending() {
				continue
			}
			// confirm when the peer still stands behind the record's root
			let polarity = match record.proof_roots.get(&chain_id) {
				Some(root) if response.validproofroots.contains(&root.root_height) =>
					VotePolarity::Confirm,
				Some(_) => VotePolarity::Reject,
				None => continue,
			};
			candidate = Some((*output_ref, record.clone(), polarity));
			break
		}
		let Some((target, record, polarity)) = candidate else {
			return Err(OffchainErr::NoValidUnconfirmed)
		};

		let existing = EvidenceRecords::<T>::get(target, polarity);
		let record_bytes = record.encode();
		let mut sent = false;
		for (key, authority_index) in keys {
			// do not re-sign with an identity that already signed
			if existing.as_ref().map_or(false, |evidence| evidence.signatures.contains(&key)) {
				trace!(target: LOG_TARGET, "💎 already signed {:?} with {:?}", target, key);
				continue
			}
			let digest =
				vote_digest(polarity, &record.currency_id, record.notarization_height, &record_bytes);
			let Some(evidence_signature) = key.sign(&digest) else {
				continue
			};
			let payload = EvidenceVotePayload {
				chain_id,
				target,
				polarity,
				observed_height: now,
				authority_index,
				evidence_signature,
			};
			let signature = Self::sign_payload(&key, &payload)?;
			Self::offchain_submit_call(Call::submit_evidence_vote { payload, signature })?;
			sent = true;
		}
		if sent {
			info!(
				target: LOG_TARGET,
				"💎 sent {:?} vote(s) for {:?} on {:?}", polarity, target, chain_id
			);
		}
		Ok(())
	}

	/// Derive the next notarization for `dest` from `prior` under this
	/// runtime's transfer executor. See [`crate::transition`].
	pub fn next_notarization_info(
		prior: &Notarization,
		source_system: &ChainId,
		dest: &CurrencyDefinition,
		last_export_height: BlockNumber,
		current_height: BlockNumber,
		transfers: &mut Vec<crosslink_primitives::notarization::ReserveTransfer>,
	) -> Result<crate::transition::NotarizationTransition, DispatchError> {
		crate::transition::next_notarization_info::<T::TransferExecutor>(
			prior,
			source_system,
			&T::HomeChainId::get(),
			dest,
			last_export_height,
			current_height,
			transfers,
		)
		.map_err(|err| match err {
			crate::transition::TransitionError::InvalidExport => Error::<T>::InvalidExport.into(),
			crate::transition::TransitionError::Internal => Error::<T>::Internal.into(),
		})
	}
}
