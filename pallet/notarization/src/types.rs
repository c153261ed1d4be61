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

//! Notarization pallet types

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_runtime::{RuntimeAppPublic, RuntimeDebug};
use sp_std::{collections::btree_map::BTreeMap, prelude::*};

pub use sp_core::{H160, H256, U256};

use crosslink_primitives::{
	notarization::{CurrencyState, Notarization, OutputRef, ProofRoot},
	notary::{
		crypto::{NotaryId, NotarySignature},
		evidence_digest, notary_confirmed_key, notary_rejected_key, AuthorityIndex, SigningOutcome,
	},
	BlockNumber, ChainId, CurrencyId,
};

/// Whether a notary vote confirms or rejects its target
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum VotePolarity {
	#[codec(index = 1)]
	Confirm,
	#[codec(index = 2)]
	Reject,
}

/// The signatures collected in one evidence record.
///
/// Polarity is a property of the whole record: a record is either
/// confirming or rejecting, never both. The sum type makes a mixed record
/// unrepresentable.
#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum EvidenceSignatures {
	#[codec(index = 1)]
	Confirming(BTreeMap<NotaryId, NotarySignature>),
	#[codec(index = 2)]
	Rejecting(BTreeMap<NotaryId, NotarySignature>),
}

impl EvidenceSignatures {
	pub fn polarity(&self) -> VotePolarity {
		match self {
			Self::Confirming(_) => VotePolarity::Confirm,
			Self::Rejecting(_) => VotePolarity::Reject,
		}
	}
	pub fn signatures(&self) -> &BTreeMap<NotaryId, NotarySignature> {
		match self {
			Self::Confirming(sigs) | Self::Rejecting(sigs) => sigs,
		}
	}
	pub fn count(&self) -> usize {
		self.signatures().len()
	}
	pub fn contains(&self, id: &NotaryId) -> bool {
		self.signatures().contains_key(id)
	}
	fn signatures_mut(&mut self) -> &mut BTreeMap<NotaryId, NotarySignature> {
		match self {
			Self::Confirming(sigs) | Self::Rejecting(sigs) => sigs,
		}
	}
}

/// Polymorphic proof artifact carried alongside evidence signatures.
/// Tagged for wire stability; future proof kinds extend the enum.
#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum EvidenceArtifact {
	#[codec(index = 1)]
	PartialTransaction(PartialTransactionProof),
}

/// Merkle branch proving a transaction's inclusion at the attested height
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct PartialTransactionProof {
	pub tx_hash: H256,
	pub branch: Vec<H256>,
	pub index: u32,
}

/// Collected notary signatures + proof artifacts for one notarization output
#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct NotaryEvidence {
	pub version: u8,
	/// The system whose notarization this evidence supports
	pub system_id: ChainId,
	/// The notarization output the evidence is about
	pub output_ref: OutputRef,
	pub signatures: EvidenceSignatures,
	pub artifacts: Vec<EvidenceArtifact>,
}

impl NotaryEvidence {
	pub const VERSION_CURRENT: u8 = 1;

	/// New empty evidence record of the given polarity
	pub fn new(system_id: ChainId, output_ref: OutputRef, polarity: VotePolarity) -> Self {
		let signatures = match polarity {
			VotePolarity::Confirm => EvidenceSignatures::Confirming(Default::default()),
			VotePolarity::Reject => EvidenceSignatures::Rejecting(Default::default()),
		};
		Self { version: Self::VERSION_CURRENT, system_id, output_ref, signatures, artifacts: vec![] }
	}

	pub fn is_confirming(&self) -> bool {
		self.signatures.polarity() == VotePolarity::Confirm
	}
	pub fn signature_count(&self) -> usize {
		self.signatures.count()
	}

	/// Sign the target payload as confirmed with `key` and record the
	/// signature.
	///
	/// A polarity conflict (this record already rejects) or a duplicate
	/// signer aborts without mutating the record.
	pub fn sign_confirmed(
		&mut self,
		key: &NotaryId,
		height: BlockNumber,
		payload: &[u8],
	) -> SigningOutcome {
		self.sign(key, height, payload, VotePolarity::Confirm)
	}

	/// Sign the target payload as rejected with `key`; the polarity guard
	/// of [`Self::sign_confirmed`] applies symmetrically.
	pub fn sign_rejected(
		&mut self,
		key: &NotaryId,
		height: BlockNumber,
		payload: &[u8],
	) -> SigningOutcome {
		self.sign(key, height, payload, VotePolarity::Reject)
	}

	fn sign(
		&mut self,
		key: &NotaryId,
		height: BlockNumber,
		payload: &[u8],
		polarity: VotePolarity,
	) -> SigningOutcome {
		if self.signatures.polarity() != polarity && self.signatures.count() > 0 {
			return SigningOutcome::Invalid
		}
		if self.signatures.contains(key) {
			return SigningOutcome::Invalid
		}
		// an empty record may still flip orientation
		if self.signatures.polarity() != polarity {
			self.signatures = match polarity {
				VotePolarity::Confirm => EvidenceSignatures::Confirming(Default::default()),
				VotePolarity::Reject => EvidenceSignatures::Rejecting(Default::default()),
			};
		}
		let digest = vote_digest(polarity, &self.system_id, height, payload);
		match key.sign(&digest) {
			Some(signature) => {
				self.signatures.signatures_mut().insert(key.clone(), signature);
				SigningOutcome::Complete
			},
			None => SigningOutcome::Invalid,
		}
	}

	/// Insert an externally produced, already verified signature.
	/// Returns false on polarity conflict or duplicate, leaving the record
	/// untouched.
	pub fn insert_signature(
		&mut self,
		id: NotaryId,
		signature: NotarySignature,
		polarity: VotePolarity,
	) -> bool {
		if self.signatures.polarity() != polarity && self.signatures.count() > 0 {
			return false
		}
		if self.signatures.contains(&id) {
			return false
		}
		if self.signatures.polarity() != polarity {
			self.signatures = match polarity {
				VotePolarity::Confirm => EvidenceSignatures::Confirming(Default::default()),
				VotePolarity::Reject => EvidenceSignatures::Rejecting(Default::default()),
			};
		}
		self.signatures.signatures_mut().insert(id, signature);
		true
	}
}

/// The digest a notary signs when voting on a notarization payload
pub fn vote_digest(
	polarity: VotePolarity,
	system_id: &ChainId,
	height: BlockNumber,
	payload: &[u8],
) -> [u8; 32] {
	let tag = match polarity {
		VotePolarity::Confirm => notary_confirmed_key(),
		VotePolarity::Reject => notary_rejected_key(),
	};
	evidence_digest(&tag, system_id, height, payload)
}

/// Verify a notary's vote signature over a notarization payload
pub fn verify_vote_signature(
	id: &NotaryId,
	signature: &NotarySignature,
	polarity: VotePolarity,
	system_id: &ChainId,
	height: BlockNumber,
	payload: &[u8],
) -> bool {
	let digest = vote_digest(polarity, system_id, height, payload);
	id.verify(&digest, signature)
}

/// What kind of record a finalization finalizes
#[derive(Copy, Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum FinalizationKind {
	#[codec(index = 1)]
	Notarization,
	#[codec(index = 2)]
	Export,
}

/// Why a finalization state transition was refused
#[derive(Copy, Clone, PartialEq, Eq, RuntimeDebug)]
pub enum FinalizationError {
	/// The finalization is already confirmed or rejected
	AlreadyFinalized,
}

/// State machine record transitioning a notarization to confirmed or
/// rejected. Terminal once either flag is set.
#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct Finalization {
	pub version: u8,
	pub kind: FinalizationKind,
	pub flags: u8,
	pub currency_id: CurrencyId,
	/// The record being finalized
	pub output_ref: OutputRef,
	/// Earliest height at which this finalization may be advanced
	pub minimum_height: BlockNumber,
	/// Evidence records consumed from earlier finalization attempts
	pub evidence_inputs: Vec<OutputRef>,
	/// Evidence records cited by this finalization
	pub evidence_outputs: Vec<OutputRef>,
}

impl Finalization {
	pub const VERSION_CURRENT: u8 = 1;
	pub const FLAG_CONFIRMED: u8 = 0b0000_0001;
	pub const FLAG_REJECTED: u8 = 0b0000_0010;

	pub fn pending(
		kind: FinalizationKind,
		currency_id: CurrencyId,
		output_ref: OutputRef,
		minimum_height: BlockNumber,
	) -> Self {
		Self {
			version: Self::VERSION_CURRENT,
			kind,
			flags: 0,
			currency_id,
			output_ref,
			minimum_height,
			evidence_inputs: vec![],
			evidence_outputs: vec![],
		}
	}

	pub fn is_confirmed(&self) -> bool {
		self.flags & Self::FLAG_CONFIRMED != 0
	}
	pub fn is_rejected(&self) -> bool {
		self.flags & Self::FLAG_REJECTED != 0
	}
	pub fn is_pending(&self) -> bool {
		self.flags & (Self::FLAG_CONFIRMED | Self::FLAG_REJECTED) == 0
	}
	/// At most one of confirmed/rejected may ever be set
	pub fn is_valid(&self) -> bool {
		!(self.is_confirmed() && self.is_rejected())
	}

	pub fn confirm(&mut self) -> Result<(), FinalizationError> {
		if !self.is_pending() {
			return Err(FinalizationError::AlreadyFinalized)
		}
		self.flags |= Self::FLAG_CONFIRMED;
		Ok(())
	}

	pub fn reject(&mut self) -> Result<(), FinalizationError> {
		if !self.is_pending() {
			return Err(FinalizationError::AlreadyFinalized)
		}
		self.flags |= Self::FLAG_REJECTED;
		Ok(())
	}
}

/// DAG of competing notarizations for one system, rebuilt from the chain
/// index on demand. Records reference each other by index into `vtx`, never
/// by owning pointers.
#[derive(Clone, PartialEq, Eq, Default, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct NotarizationChainData {
	/// All indexed notarization records in block order
	pub vtx: Vec<(OutputRef, Notarization)>,
	/// Chains of indices into `vtx`, each linked by `prev_notarization`
	pub forks: Vec<Vec<u32>>,
	/// Index of the confirmed tip in `vtx`, if any
	pub last_confirmed: Option<u32>,
	/// The fork currently considered canonical
	pub best_chain: u32,
}

impl NotarizationChainData {
	pub fn confirmed(&self) -> Option<&(OutputRef, Notarization)> {
		self.last_confirmed.and_then(|i| self.vtx.get(i as usize))
	}
	pub fn best_fork(&self) -> Option<&Vec<u32>> {
		self.forks.get(self.best_chain as usize)
	}
	/// The tip record of the canonical fork
	pub fn best_tip(&self) -> Option<&(OutputRef, Notarization)> {
		self.best_fork()
			.and_then(|fork| fork.last())
			.and_then(|i| self.vtx.get(*i as usize))
	}
}

/// An earned notarization built by the offchain driver.
/// This is signed and shared with the runtime for inclusion.
#[derive(Encode, Decode, Clone, PartialEq, RuntimeDebug, TypeInfo)]
pub struct EarnedNotarizationPayload {
	/// The notarized peer system
	pub chain_id: ChainId,
	/// The local tip height when the peer was queried; inclusion at any
	/// other height is stale
	pub observed_height: BlockNumber,
	/// The ordinal index of the submitter in the peer's notary set
	pub authority_index: AuthorityIndex,
	pub notarization: Notarization,
}

/// An independent notary vote over a pending notarization
/// This is signed and shared with the runtime after local verification
#[derive(Encode, Decode, Clone, PartialEq, RuntimeDebug, TypeInfo)]
pub struct EvidenceVotePayload {
	pub chain_id: ChainId,
	/// The notarization output being voted on
	pub target: OutputRef,
	pub polarity: VotePolarity,
	/// The local tip height when the peer was queried; inclusion at any
	/// other height is stale
	pub observed_height: BlockNumber,
	/// The ordinal index of the signer in the notary set
	/// It may be used with chain storage to lookup the public key of the notary
	pub authority_index: AuthorityIndex,
	/// The notary's signature over the target's vote digest
	pub evidence_signature: NotarySignature,
}

/// JSON-RPC protocol version header
const JSONRPC: &str = "2.0";
/// JSON-RPC method name for the request
const METHOD_GET_BEST_PROOF_ROOT: &str = "getbestproofroot";

/// Parameter object for a `getbestproofroot` request
#[derive(Serialize, Debug)]
pub struct BestProofRootParams {
	/// Proof roots this chain knows for the peer, in record order
	pub proofroots: Vec<ProofRoot>,
	/// Height of the last confirmed notarization
	pub lastconfirmed: u32,
}

/// Request for 'getbestproofroot'
#[derive(Serialize, Debug)]
pub struct GetBestProofRootRequest {
	#[serde(rename = "jsonrpc")]
	/// The version of the JSON RPC spec
	pub json_rpc: &'static str,
	/// The method which is called
	pub method: &'static str,
	/// Arguments supplied to the method
	pub params: [BestProofRootParams; 1],
	/// The id for the request
	pub id: usize,
}

impl GetBestProofRootRequest {
	pub fn new(params: BestProofRootParams, id: usize) -> Self {
		Self { json_rpc: JSONRPC, method: METHOD_GET_BEST_PROOF_ROOT, params: [params], id }
	}
}

/// Generic JSON-RPC response envelope
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize)]
pub struct RpcResponse<'a, D> {
	jsonrpc: &'a str,
	id: u32,
	pub result: Option<D>,
}

/// The peer's answer to `getbestproofroot`
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Encode, Decode, TypeInfo)]
pub struct BestProofRootResponse {
	/// Index into the submitted `proofroots` of the best root the peer
	/// agrees with; `-1` signals no agreement
	pub bestproofrootindex: i32,
	/// Heights of the submitted roots the peer considers valid
	#[serde(default)]
	pub validproofroots: Vec<BlockNumber>,
	/// The peer's own latest proof root
	#[serde(default)]
	pub latestproofroot: Option<ProofRoot>,
	/// Currency states known to the peer at its latest root
	#[serde(default)]
	pub currencystates: Vec<CurrencyState>,
}

/// Error types for peer RPC requests
#[derive(Encode, Decode, Debug, Clone, PartialEq, TypeInfo)]
pub enum PeerRpcError {
	/// HTTP network request failed or timed out
	HttpFetch,
	/// Response JSON was invalid
	InvalidJson,
	/// offchain worker not configured with a peer RPC endpoint
	OcwConfig,
}

/// Provides an api for JSON-RPC request/responses to the bridged peer system
pub trait PeerRpcApi {
	/// Ask the peer which of our known proof roots it agrees with
	fn get_best_proof_root(
		chain_id: &ChainId,
		proofroots: Vec<ProofRoot>,
		lastconfirmed: u32,
	) -> Result<BestProofRootResponse, PeerRpcError>;
}
