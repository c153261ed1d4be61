#![cfg(feature = "runtime-benchmarks")]

use super::*;
#[cfg(test)]
use crate::mock::MockCurrencyRegistry;
use crate::Pallet as Notarization;
use frame_benchmarking::{benchmarks, impl_benchmark_test_suite};
use frame_support::assert_ok;
use frame_system::RawOrigin;
use sp_core::{H160, H256};
use sp_std::prelude::*;

use crosslink_primitives::notarization::{CurrencyState, Notarization as NotarizationRecord};

fn peer_chain() -> ChainId {
	H160::from_low_u64_be(0xbeef)
}

fn definition_record(chain_id: ChainId) -> NotarizationRecord {
	NotarizationRecord {
		version: NotarizationRecord::VERSION_CURRENT,
		flags: NotarizationRecord::FLAG_DEFINITION,
		currency_id: chain_id,
		notarization_height: 1,
		prev_height: 1,
		hash_prev_notarization: H256::default(),
		currency_state: CurrencyState { currency_id: chain_id, ..Default::default() },
		..Default::default()
	}
}

benchmarks! {
	add_notary_chain {
		assert!(NotaryChains::<T>::get().is_empty());
	}: _(RawOrigin::Root, peer_chain())
	verify {
		assert_eq!(NotaryChains::<T>::get(), vec![peer_chain()]);
	}

	activate_notary_chain {
		let chain_id = peer_chain();
		#[cfg(test)]
		MockCurrencyRegistry::register(crosslink_primitives::notarization::CurrencyDefinition {
			currency_id: chain_id,
			system_id: chain_id,
			..Default::default()
		});
		assert_ok!(Notarization::<T>::add_notary_chain(RawOrigin::Root.into(), chain_id));
	}: _(RawOrigin::Root, chain_id, definition_record(chain_id))
	verify {
		assert_eq!(NotarizationIndex::<T>::get(chain_id).len(), 1);
	}
}

impl_benchmark_test_suite!(
	Notarization,
	crate::mock::ExtBuilder::default().build(),
	crate::mock::TestRuntime
);
