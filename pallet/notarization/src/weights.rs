// This file is part of Substrate.

// Copyright (C) 2021 Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Autogenerated weights for pallet_notarization
//!
//! THIS FILE WAS AUTO-GENERATED USING THE SUBSTRATE BENCHMARK CLI VERSION 4.0.0-dev
//! DATE: 2023-02-13, STEPS: `50`, REPEAT: 20, LOW RANGE: `[]`, HIGH RANGE: `[]`
//! EXECUTION: Some(Wasm), WASM-EXECUTION: Compiled, CHAIN: Some("dev"), DB CACHE: 1024

// Executed Command:
// target/release/crosslink
// benchmark
// --chain=dev
// --execution=wasm
// --wasm-execution=compiled
// --pallet=pallet_notarization
// --extrinsic=*
// --steps=50
// --repeat=20
// --heap-pages=4096
// --template=./.maintain/frame-weight-template.hbs
// --output=./pallet/notarization/src/weights.rs

#![allow(unused_parens)]
#![allow(unused_imports)]
#![allow(clippy::all)]

use frame_support::{
	traits::Get,
	weights::{constants::RocksDbWeight, Weight},
};
use sp_std::marker::PhantomData;

/// Weight functions needed for pallet_notarization.
pub trait WeightInfo {
	fn add_notary_chain() -> Weight;
	fn activate_notary_chain() -> Weight;
	fn submit_accepted_notarization() -> Weight;
	fn submit_earned_notarization() -> Weight;
	fn submit_evidence_vote() -> Weight;
}

/// Weights for pallet_notarization using the Substrate node and recommended hardware.
pub struct SubstrateWeight<T>(PhantomData<T>);
impl<T: frame_system::Config> WeightInfo for SubstrateWeight<T> {
	// Storage: Notarization NotaryChains (r:1 w:1)
	fn add_notary_chain() -> Weight {
		(18_000_000 as Weight)
			.saturating_add(T::DbWeight::get().reads(1 as Weight))
			.saturating_add(T::DbWeight::get().writes(1 as Weight))
	}
	// Storage: Notarization NotarizationIndex (r:1 w:1)
	// Storage: Notarization NotaryChains (r:1 w:1)
	// Storage: Notarization Notarizations (r:0 w:1)
	// Storage: Notarization Finalizations (r:0 w:1)
	// Storage: Notarization LatestAccepted (r:0 w:1)
	fn activate_notary_chain() -> Weight {
		(41_000_000 as Weight)
			.saturating_add(T::DbWeight::get().reads(2 as Weight))
			.saturating_add(T::DbWeight::get().writes(5 as Weight))
	}
	// Storage: Notarization NotaryChains (r:1 w:0)
	// Storage: Notarization NotarizationIndex (r:1 w:1)
	// Storage: Notarization Notarizations (r:4 w:1)
	// Storage: Notarization Finalizations (r:3 w:1)
	// Storage: Notarization LatestAccepted (r:1 w:1)
	// Storage: Notarization EvidenceRecords (r:0 w:1)
	fn submit_accepted_notarization() -> Weight {
		(197_000_000 as Weight)
			.saturating_add(T::DbWeight::get().reads(10 as Weight))
			.saturating_add(T::DbWeight::get().writes(5 as Weight))
	}
	// Storage: Notarization NotaryChains (r:1 w:0)
	// Storage: Notarization NotarizationIndex (r:1 w:1)
	// Storage: Notarization Notarizations (r:4 w:1)
	// Storage: Notarization Finalizations (r:3 w:1)
	fn submit_earned_notarization() -> Weight {
		(104_000_000 as Weight)
			.saturating_add(T::DbWeight::get().reads(9 as Weight))
			.saturating_add(T::DbWeight::get().writes(3 as Weight))
	}
	// Storage: Notarization Notarizations (r:1 w:0)
	// Storage: Notarization Finalizations (r:1 w:1)
	// Storage: Notarization EvidenceRecords (r:1 w:1)
	fn submit_evidence_vote() -> Weight {
		(123_000_000 as Weight)
			.saturating_add(T::DbWeight::get().reads(3 as Weight))
			.saturating_add(T::DbWeight::get().writes(2 as Weight))
	}
}

// For backwards compatibility and tests
impl WeightInfo for () {
	fn add_notary_chain() -> Weight {
		(18_000_000 as Weight)
			.saturating_add(RocksDbWeight::get().reads(1 as Weight))
			.saturating_add(RocksDbWeight::get().writes(1 as Weight))
	}
	fn activate_notary_chain() -> Weight {
		(41_000_000 as Weight)
			.saturating_add(RocksDbWeight::get().reads(2 as Weight))
			.saturating_add(RocksDbWeight::get().writes(5 as Weight))
	}
	fn submit_accepted_notarization() -> Weight {
		(197_000_000 as Weight)
			.saturating_add(RocksDbWeight::get().reads(10 as Weight))
			.saturating_add(RocksDbWeight::get().writes(5 as Weight))
	}
	fn submit_earned_notarization() -> Weight {
		(104_000_000 as Weight)
			.saturating_add(RocksDbWeight::get().reads(9 as Weight))
			.saturating_add(RocksDbWeight::get().writes(3 as Weight))
	}
	fn submit_evidence_vote() -> Weight {
		(123_000_000 as Weight)
			.saturating_add(RocksDbWeight::get().reads(3 as Weight))
			.saturating_add(RocksDbWeight::get().writes(2 as Weight))
	}
}
