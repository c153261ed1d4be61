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

//! Notary protocol common types & traits
//! Shared between the notarization pallet and any client-side worker

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_io::hashing::keccak_256;
use sp_runtime::KeyTypeId;
use sp_std::prelude::*;

use crate::{BlockNumber, ChainId};

/// The session key type for notary identities
pub const NOTARY_KEY_TYPE: KeyTypeId = KeyTypeId(*b"ntry");

/// Crypto types for the notary protocol
pub mod crypto {
	mod app_crypto {
		use crate::notary::NOTARY_KEY_TYPE;
		use sp_application_crypto::{app_crypto, ecdsa};
		app_crypto!(ecdsa, NOTARY_KEY_TYPE);
	}
	sp_application_crypto::with_pair! {
		/// A notary keypair using ecdsa as its crypto.
		pub type NotaryPair = app_crypto::Pair;
	}
	/// A notary signature using ecdsa as its crypto.
	pub type NotarySignature = app_crypto::Signature;
	/// A notary identifier using ecdsa as its crypto.
	pub type NotaryId = app_crypto::Public;
}

/// The ordinal index of a notary in a currency's notary set.
pub type AuthorityIndex = u16;

/// Outcome of asking the local keystore to produce an evidence signature.
///
/// `Partial` is reserved for multi-key notary identities where the keystore
/// holds only a subset of the identity's keys; single-key identities always
/// produce `Complete` or `Invalid`.
#[derive(Encode, Decode, Debug, Copy, Clone, PartialEq, Eq, TypeInfo)]
pub enum SigningOutcome {
	/// Signing failed or the key cannot sign for the identity
	Invalid,
	/// A signature was produced but the identity's threshold is not met
	Partial,
	/// A signature meeting the identity's threshold was produced
	Complete,
}

/// Domain tag bound into every confirming evidence signature
pub fn notary_confirmed_key() -> [u8; 32] {
	keccak_256(b"crosslink.notarization.signature.confirmed")
}

/// Domain tag bound into every rejecting evidence signature
pub fn notary_rejected_key() -> [u8; 32] {
	keccak_256(b"crosslink.notarization.signature.rejected")
}

/// Compute the digest a notary signs over an evidence target.
///
/// The payload is hashed raw, without any length prefix, then bound to the
/// polarity domain tag, the attested system, and the target's height. The
/// statement list and prefix of the signing scheme are empty.
pub fn evidence_digest(
	domain_tag: &[u8; 32],
	system_id: &ChainId,
	height: BlockNumber,
	payload: &[u8],
) -> [u8; 32] {
	let payload_hash = keccak_256(payload);
	let mut buf = Vec::with_capacity(32 + 20 + 4 + 32);
	buf.extend_from_slice(domain_tag);
	buf.extend_from_slice(system_id.as_bytes());
	buf.extend_from_slice(&height.to_be_bytes());
	buf.extend_from_slice(&payload_hash);
	keccak_256(&buf)
}
