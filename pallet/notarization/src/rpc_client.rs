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
use crate::types::{
	BestProofRootParams, BestProofRootResponse, GetBestProofRootRequest, PeerRpcApi, PeerRpcError,
	RpcResponse,
};
use crosslink_pallet_common::log;
use crosslink_primitives::{notarization::ProofRoot, ChainId, PEER_HTTP_URI};
use sp_runtime::offchain::{http::Request, Duration, StorageKind};
use sp_std::{prelude::*, vec};

#[cfg(not(feature = "std"))]
use sp_std::alloc::string::ToString;
#[cfg(feature = "std")]
use std::string::ToString;

/// Deadline for any network requests to the peer's JSON-RPC endpoint
/// Allows ~3 offchain requests per block
const REQUEST_TTL_MS: u64 = 1_500;

/// Provides minimal peer system RPC queries for the notary protocol
pub struct PeerRpcClient;

impl PeerRpcApi for PeerRpcClient {
	/// Ask the peer which of our known proof roots it agrees with, and for
	/// its latest root and currency states
	fn get_best_proof_root(
		chain_id: &ChainId,
		proofroots: Vec<ProofRoot>,
		lastconfirmed: u32,
	) -> Result<BestProofRootResponse, PeerRpcError> {
		let request = GetBestProofRootRequest::new(
			BestProofRootParams { proofroots, lastconfirmed },
			random_request_id(),
		);
		let resp_bytes = Self::query_peer(&request).map_err(|e| {
			log!(error, "💎 read peer-rpc API error for {:?}: {:?}", chain_id, e);
			e
		})?;

		// Deserialize JSON to struct
		serde_json::from_slice::<RpcResponse<BestProofRootResponse>>(&resp_bytes)
			.map_err(|err| {
				log!(error, "💎 deserialize json response error: {:?}", err);
				PeerRpcError::InvalidJson
			})?
			.result
			.ok_or(PeerRpcError::InvalidJson)
	}
}

impl PeerRpcClient {
	/// This function uses the `offchain::http` API to query the remote peer
	/// system, and returns the JSON response as vector of bytes.
	fn query_peer<R: serde::Serialize>(request_body: &R) -> Result<Vec<u8>, PeerRpcError> {
		// Load the peer http URI from offchain storage
		// this should have been configured on start up by passing e.g. `--peer-http`
		// e.g. `--peer-http=http://localhost:27486`
		let Some(peer_http_uri) =
			sp_io::offchain::local_storage_get(StorageKind::PERSISTENT, &PEER_HTTP_URI)
		else {
			log!(error, "💎 peer http uri is not configured! set --peer-http=<value> on start up");
			return Err(PeerRpcError::OcwConfig)
		};
		let peer_http_uri =
			core::str::from_utf8(&peer_http_uri).map_err(|_| PeerRpcError::OcwConfig)?;

		const HEADER_CONTENT_TYPE: &str = "application/json";
		log!(trace, "💎 sending request to: {}", peer_http_uri);
		let body = serde_json::to_string(request_body).map_err(|_| PeerRpcError::InvalidJson)?;
		let body_raw = body.as_bytes();
		// Initiate an external HTTP POST request. This is using high-level wrappers from
		// `sp_runtime`.
		let request = Request::post(peer_http_uri, vec![body_raw]);

		// Keeping the offchain worker execution time reasonable, so limiting the call to be within
		// 1.5s.
		let timeout = sp_io::offchain::timestamp().add(Duration::from_millis(REQUEST_TTL_MS));
		let pending = request
			.add_header("Content-Type", HEADER_CONTENT_TYPE)
			.add_header("Content-Length", &body_raw.len().to_string())
			.deadline(timeout)
			.send()
			.map_err(|err| {
				log!(error, "💎 http request error: {:?}", err);
				PeerRpcError::HttpFetch
			})?;

		// By default, the http request is async from the runtime perspective. So we are asking the
		// runtime to wait here.
		// The returning value here is a `Result` of `Result`, so we are unwrapping it twice by two
		// `?`
		let response = pending
			.try_wait(timeout)
			.map_err(|err| {
				log!(error, "💎 http request error: deadline reached: {:?}", err);
				PeerRpcError::HttpFetch
			})?
			.map_err(|err| {
				log!(error, "💎 http request error: deadline reached: {:?}", err);
				PeerRpcError::HttpFetch
			})?;

		if response.code != 200 {
			log!(error, "💎 http request status code: {}", response.code);
			return Err(PeerRpcError::HttpFetch)
		}

		Ok(response.body().collect::<Vec<u8>>())
	}
}

/// Return a random usize value
fn random_request_id() -> usize {
	let seed = sp_io::offchain::random_seed();
	u32::from_be_bytes(seed[..4].try_into().unwrap_or_default()) as usize
}
