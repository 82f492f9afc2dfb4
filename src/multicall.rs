//! Multicall batch executor.
//!
//! Packs many independent read calls into one `aggregate3` round trip
//! against a Multicall3 contract, with per-call success/failure. Two failure
//! levels are kept strictly apart:
//!
//! - **batch-level**: the aggregate call itself failed (RPC unreachable,
//!   timeout, multicall contract missing) - surfaced as `Err` from
//!   [`Multicall::run`], the cue for callers to fall back;
//! - **per-call**: one inner call reverted - surfaced as
//!   [`CallOutcome::Failure`] in an otherwise successful result.

use crate::chain_client::{CallError, ChainClient};
use crate::metrics;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::types::{Address, Bytes};
use log::{debug, warn};
use std::sync::Arc;

/// A single read call to be batched.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let selector = if self.call_data.len() >= 4 {
            hex::encode(&self.call_data[..4])
        } else {
            String::from("????????")
        };
        write!(f, "Call {{ target: {:?}, selector: 0x{} }}", self.target, selector)
    }
}

/// Outcome of one call inside a successful batch. Result order always
/// matches call order.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success(Bytes),
    Failure(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Returns the payload of a successful, non-empty return slot.
    /// Multicall3 reports `success = true` with empty data for calls to
    /// addresses without code, so empty payloads count as failures too.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            CallOutcome::Success(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }
}

/// The aggregate call itself failed; no per-call outcomes exist.
#[derive(Debug, thiserror::Error)]
#[error("multicall batch failed: {0}")]
pub struct BatchError(pub String);

/// Multicall batch executor over a [`ChainClient`].
#[derive(Clone)]
pub struct Multicall<C> {
    chain: Arc<C>,
    multicall_address: Address,
    batch_size: usize,
    max_retries: u32,
}

impl<C: ChainClient> Multicall<C> {
    pub fn new(chain: Arc<C>, multicall_address: Address, batch_size: usize) -> Self {
        // RPC providers start rejecting aggregate payloads beyond ~200 calls
        let batch_size = batch_size.clamp(1, 200);
        Self {
            chain,
            multicall_address,
            batch_size,
            max_retries: 1,
        }
    }

    /// Set retry count for transient aggregate failures.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Runs a batch of calls. `Ok` carries one [`CallOutcome`] per input
    /// call, in input order; `Err` is a batch-level failure.
    ///
    /// An empty call list short-circuits without a network round trip.
    pub async fn run(&self, calls: Vec<Call>) -> Result<Vec<CallOutcome>, BatchError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls so repeated reads cost one slot
        let mut unique_calls = indexmap::IndexMap::new();
        let mut original_indices = vec![0usize; calls.len()];
        for (i, call) in calls.iter().enumerate() {
            let (index, _) = unique_calls.insert_full(call.clone(), ());
            original_indices[i] = index;
        }
        let unique: Vec<Call> = unique_calls.into_keys().collect();
        if unique.len() < calls.len() {
            debug!("multicall coalesced {} calls into {}", calls.len(), unique.len());
        }

        let mut outcomes: Vec<CallOutcome> = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(self.batch_size) {
            metrics::record_multicall_batch_size(chunk.len() as f64);
            outcomes.extend(self.aggregate_with_retries(chunk).await?);
        }

        Ok(original_indices
            .into_iter()
            .map(|index| outcomes[index].clone())
            .collect())
    }

    async fn aggregate_with_retries(&self, calls: &[Call]) -> Result<Vec<CallOutcome>, BatchError> {
        let mut attempt = 0u32;
        loop {
            match self.aggregate(calls).await {
                Ok(outcomes) => return Ok(outcomes),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "multicall aggregate failed (attempt {attempt}/{}): {e}",
                        self.max_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One `aggregate3` round trip.
    ///
    /// `aggregate3((address,bool,bytes)[]) -> (bool,bytes)[]` with
    /// `allowFailure = true` on every call, so a single revert shows up in
    /// its result slot instead of failing the whole aggregate.
    async fn aggregate(&self, calls: &[Call]) -> Result<Vec<CallOutcome>, BatchError> {
        let call_tokens: Vec<Token> = calls
            .iter()
            .map(|call| {
                Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bool(true),
                    Token::Bytes(call.call_data.to_vec()),
                ])
            })
            .collect();

        #[allow(deprecated)]
        let function = Function {
            name: "aggregate3".to_string(),
            inputs: vec![Param {
                name: "calls".to_string(),
                kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::Bool,
                    ParamType::Bytes,
                ]))),
                internal_type: None,
            }],
            outputs: vec![Param {
                name: "returnData".to_string(),
                kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                    ParamType::Bool,
                    ParamType::Bytes,
                ]))),
                internal_type: None,
            }],
            constant: None,
            state_mutability: StateMutability::Payable,
        };

        let calldata = function
            .encode_input(&[Token::Array(call_tokens)])
            .map_err(|e| BatchError(format!("encode aggregate3: {e}")))?;

        let response = self
            .chain
            .eth_call(self.multicall_address, Bytes::from(calldata))
            .await
            .map_err(|e| match e {
                CallError::Revert(r) => BatchError(format!("aggregate3 reverted: {r}")),
                CallError::Transport(t) => BatchError(t),
            })?;

        let decoded = ethers::abi::decode(
            &[ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Bool,
                ParamType::Bytes,
            ])))],
            &response,
        )
        .map_err(|e| BatchError(format!("decode aggregate3 response: {e}")))?;

        let results_array = decoded
            .into_iter()
            .next()
            .and_then(|t| t.into_array())
            .ok_or_else(|| BatchError("invalid multicall response format".to_string()))?;

        if results_array.len() != calls.len() {
            return Err(BatchError(format!(
                "multicall returned {} slots for {} calls",
                results_array.len(),
                calls.len()
            )));
        }

        let mut outcomes = Vec::with_capacity(results_array.len());
        for token in results_array {
            let mut tuple = match token {
                Token::Tuple(tuple) if tuple.len() == 2 => tuple,
                other => {
                    return Err(BatchError(format!(
                        "invalid multicall result slot: {other:?}"
                    )))
                }
            };
            let data = match tuple.remove(1) {
                Token::Bytes(data) => data,
                other => return Err(BatchError(format!("invalid return data slot: {other:?}"))),
            };
            let success = matches!(tuple.remove(0), Token::Bool(true));
            outcomes.push(if success {
                CallOutcome::Success(Bytes::from(data))
            } else {
                CallOutcome::Failure("call reverted".to_string())
            });
        }
        Ok(outcomes)
    }
}
