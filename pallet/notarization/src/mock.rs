/* Copyright 2019-2021 Centrality Investments Limited
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
use crate::{
	self as pallet_notarization,
	types::{BestProofRootResponse, PeerRpcApi, PeerRpcError},
	Config,
};
use frame_support::{
	parameter_types,
	storage::{StorageDoubleMap as _, StorageMap as _, StorageValue as _},
};
use sp_core::{H160, H256};
use sp_keystore::{testing::KeyStore, KeystoreExt, SyncCryptoStore};
use sp_runtime::{
	testing::{Header, TestXt},
	traits::{BlakeTwo256, IdentityLookup},
	RuntimeAppPublic,
};
use std::sync::Arc;

use crosslink_pallet_common::{
	CurrencyRegistry, ImportOutput, ProofRootSource, ReserveTransferExecutor,
	TransferExecutionError, TransferOutcome,
};
use crosslink_primitives::{
	notarization::{CurrencyDefinition, CurrencyState, ProofRoot, ReserveTransfer},
	notary::crypto::{NotaryId, NotarySignature},
	AccountId, BlockNumber as CoreBlockNumber, ChainId, CurrencyId,
};

type BlockNumber = u64;
pub type Extrinsic = TestXt<Call, ()>;
pub type UncheckedExtrinsic = frame_system::mocking::MockUncheckedExtrinsic<TestRuntime>;
pub type Block = frame_system::mocking::MockBlock<TestRuntime>;

frame_support::construct_runtime!(
	pub enum TestRuntime where
		Block = Block,
		NodeBlock = Block,
		UncheckedExtrinsic = UncheckedExtrinsic,
	{
		System: frame_system::{Pallet, Call, Config, Storage, Event<T>},
		Notarization: pallet_notarization::{Pallet, Call, Storage, Event<T>, ValidateUnsigned},
	}
);

parameter_types! {
	pub const BlockHashCount: u64 = 250;
}
impl frame_system::Config for TestRuntime {
	type BlockWeights = ();
	type BlockLength = ();
	type BaseCallFilter = frame_support::traits::Everything;
	type Origin = Origin;
	type Index = u64;
	type BlockNumber = BlockNumber;
	type Call = Call;
	type Hash = H256;
	type Hashing = BlakeTwo256;
	type AccountId = AccountId;
	type Lookup = IdentityLookup<Self::AccountId>;
	type Header = Header;
	type BlockHashCount = BlockHashCount;
	type Event = Event;
	type DbWeight = ();
	type Version = ();
	type PalletInfo = PalletInfo;
	type AccountData = ();
	type OnNewAccount = ();
	type OnKilledAccount = ();
	type SystemWeightInfo = ();
	type SS58Prefix = ();
	type OnSetCode = ();
	type MaxConsumers = frame_support::traits::ConstU32<16>;
}

parameter_types! {
	pub const HomeChainId: ChainId = H160(hex_literal_home());
	pub const NotarizationPeriod: CoreBlockNumber = 10;
	pub const MinBlocksBeforeFinalized: CoreBlockNumber = 10;
	pub const FinalizationMaturity: CoreBlockNumber = 15;
}

/// The home system identity used across tests
pub const fn hex_literal_home() -> [u8; 20] {
	[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]
}

pub fn home_chain() -> ChainId {
	H160(hex_literal_home())
}

impl Config for TestRuntime {
	type Event = Event;
	type HomeChainId = HomeChainId;
	type NotarizationPeriod = NotarizationPeriod;
	type MinBlocksBeforeFinalized = MinBlocksBeforeFinalized;
	type FinalizationMaturity = FinalizationMaturity;
	type ProofRoots = MockProofRootSource;
	type Currencies = MockCurrencyRegistry;
	type TransferExecutor = MockTransferExecutor;
	type RpcClient = MockPeerRpcClient;
	type Call = Call;
	type WeightInfo = ();
}

/// Serves proof roots for the home chain from test storage
pub struct MockProofRootSource;

impl MockProofRootSource {
	pub fn set_root_at(height: CoreBlockNumber, root: ProofRoot) {
		test_storage::ProofRootAt::insert(height, root);
	}
	pub fn set_tip_height(height: CoreBlockNumber) {
		test_storage::TipHeight::put(height);
	}
}

impl ProofRootSource for MockProofRootSource {
	fn proof_root_at(height: CoreBlockNumber) -> Option<ProofRoot> {
		if height > Self::tip_height() {
			return None
		}
		test_storage::ProofRootAt::get(height)
	}
	fn tip_height() -> CoreBlockNumber {
		test_storage::TipHeight::get()
	}
}

/// Serves currency definitions and indexed currency states from test storage
pub struct MockCurrencyRegistry;

impl MockCurrencyRegistry {
	pub fn register(definition: CurrencyDefinition) {
		test_storage::Definitions::insert(definition.currency_id, definition);
	}
	pub fn set_state_at(currency_id: CurrencyId, height: CoreBlockNumber, state: CurrencyState) {
		test_storage::CurrencyStateAt::insert(currency_id, height, state);
	}
	pub fn set_local_token(currency_id: CurrencyId) {
		test_storage::LocalTokens::insert(currency_id, true);
	}
}

impl CurrencyRegistry for MockCurrencyRegistry {
	fn currency_definition(currency_id: &CurrencyId) -> Option<CurrencyDefinition> {
		test_storage::Definitions::get(currency_id)
	}
	fn currency_state_at(currency_id: &CurrencyId, height: CoreBlockNumber) -> Option<CurrencyState> {
		test_storage::CurrencyStateAt::get(currency_id, height)
	}
	fn is_local_token(currency_id: &CurrencyId) -> bool {
		test_storage::LocalTokens::get(currency_id)
	}
}

/// Minimal reserve transfer executor for tests.
///
/// Refunds and pre-conversions (already folded into the state by the
/// transition's validation pass) are skipped; conversions credit their
/// reserve and are priced with the incoming conversion price; the price
/// after a pass tracks the reserves for fractional currencies. A test may
/// force the next application to report an invalid export.
pub struct MockTransferExecutor;

impl MockTransferExecutor {
	pub fn fail_next_with_invalid_export() {
		test_storage::ForceInvalidExport::put(true);
	}
}

impl ReserveTransferExecutor for MockTransferExecutor {
	fn apply_reserve_transfers(
		_source_system: &ChainId,
		dest: &CurrencyDefinition,
		state: &mut CurrencyState,
		transfers: &[ReserveTransfer],
	) -> Result<TransferOutcome, TransferExecutionError> {
		if test_storage::ForceInvalidExport::take() {
			return Err(TransferExecutionError::InvalidExport)
		}
		let mut outcome = TransferOutcome::default();
		for transfer in transfers {
			if transfer.is_refund() || transfer.is_preconversion() {
				continue
			}
			let Some(idx) = dest.currencies.iter().position(|c| c == &transfer.currency) else {
				return Err(TransferExecutionError::InvalidExport)
			};
			let price = *state.conversion_price.get(idx).unwrap_or(&1);
			state.reserves[idx] = state.reserves[idx]
				.checked_add(transfer.amount)
				.ok_or(TransferExecutionError::Arithmetic)?;
			let amount_out = transfer.amount.saturating_mul(price);
			outcome.outputs.push(ImportOutput {
				currency: transfer.dest_currency,
				amount: amount_out,
				destination: transfer.destination.clone(),
			});
			*outcome.imported.entry(transfer.dest_currency).or_default() += amount_out;
		}
		if dest.is_fractional() {
			state.conversion_price = state.reserves.clone();
		}
		Ok(outcome)
	}
}

/// Mock peer rpc client, answering from test storage
pub struct MockPeerRpcClient;

impl MockPeerRpcClient {
	/// store the peer's next response for `chain_id`
	pub fn mock_response_for(chain_id: ChainId, response: BestProofRootResponse) {
		test_storage::BestRootResponseFor::insert(chain_id, response);
	}
}

impl PeerRpcApi for MockPeerRpcClient {
	fn get_best_proof_root(
		chain_id: &ChainId,
		_proofroots: Vec<ProofRoot>,
		_lastconfirmed: u32,
	) -> Result<BestProofRootResponse, PeerRpcError> {
		test_storage::BestRootResponseFor::get(chain_id).ok_or(PeerRpcError::HttpFetch)
	}
}

pub(crate) mod test_storage {
	//! storage used by tests to parameterize the mock collaborators
	use super::Config;
	use crate::types::BestProofRootResponse;
	use crosslink_primitives::{
		notarization::{CurrencyDefinition, CurrencyState, ProofRoot},
		BlockNumber, ChainId, CurrencyId,
	};
	use frame_support::decl_storage;

	pub struct Module<T>(sp_std::marker::PhantomData<T>);
	decl_storage! {
		trait Store for Module<T: Config> as NotarizationTest {
			pub ProofRootAt: map hasher(twox_64_concat) BlockNumber => Option<ProofRoot>;
			pub TipHeight: BlockNumber;
			pub Definitions: map hasher(twox_64_concat) CurrencyId => Option<CurrencyDefinition>;
			pub CurrencyStateAt: double_map hasher(twox_64_concat) CurrencyId, hasher(twox_64_concat) BlockNumber => Option<CurrencyState>;
			pub LocalTokens: map hasher(twox_64_concat) CurrencyId => bool;
			pub BestRootResponseFor: map hasher(twox_64_concat) ChainId => Option<BestProofRootResponse>;
			pub ForceInvalidExport: bool;
		}
	}
}

impl frame_system::offchain::SigningTypes for TestRuntime {
	type Public = <crosslink_primitives::Signature as sp_runtime::traits::Verify>::Signer;
	type Signature = crosslink_primitives::Signature;
}

impl<C> frame_system::offchain::SendTransactionTypes<C> for TestRuntime
where
	Call: From<C>,
{
	type Extrinsic = Extrinsic;
	type OverarchingCall = Call;
}

/// A notary identity controlled by tests: its keypair signs evidence
/// digests directly, without the node keystore
#[derive(Clone)]
pub struct TestNotary {
	pair: sp_core::ecdsa::Pair,
}

impl TestNotary {
	pub fn new(seed: &str) -> Self {
		let pair = <sp_core::ecdsa::Pair as sp_core::Pair>::from_string(seed, None)
			.expect("static values are valid");
		Self { pair }
	}
	pub fn public(&self) -> NotaryId {
		NotaryId::from(<sp_core::ecdsa::Pair as sp_core::Pair>::public(&self.pair))
	}
	pub fn sign(&self, message: &[u8]) -> NotarySignature {
		NotarySignature::from(<sp_core::ecdsa::Pair as sp_core::Pair>::sign(&self.pair, message))
	}
}

/// Deterministic test notaries
pub fn test_notaries(n: u8) -> Vec<TestNotary> {
	(0..n).map(|i| TestNotary::new(&format!("//Notary{}", i))).collect()
}

#[derive(Clone, Copy, Default)]
pub struct ExtBuilder {
	with_keystore: bool,
}

impl ExtBuilder {
	pub fn with_keystore(mut self) -> Self {
		self.with_keystore = true;
		self
	}

	pub fn build(self) -> sp_io::TestExternalities {
		let ext = frame_system::GenesisConfig::default().build_storage::<TestRuntime>().unwrap();
		let mut ext: sp_io::TestExternalities = ext.into();

		ext.execute_with(|| System::initialize(&1, &[0u8; 32].into(), &Default::default()));

		if self.with_keystore {
			let keystore = KeyStore::new();
			SyncCryptoStore::ecdsa_generate_new(&keystore, NotaryId::ID, None).unwrap();
			ext.register_extension(KeystoreExt(Arc::new(keystore)));
		}

		ext
	}
}
