//! Read-only chain access seam.
//!
//! Everything above this layer speaks [`ChainClient`], so tests can stand in
//! a simulated chain and inject failures per call without touching an RPC
//! endpoint. The production implementation wraps any ethers `Middleware`.

use crate::settings::Settings;
use anyhow::Context as _;
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, MiddlewareError, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Outcome classification for a single `eth_call`.
///
/// The split matters: a [`CallError::Revert`] means the node executed the
/// call and the contract rejected it (degrade one field, keep the pool),
/// while [`CallError::Transport`] means infrastructure trouble (degrade the
/// whole strategy and fall back).
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("call reverted: {0}")]
    Revert(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Read-only JSON-RPC access to one blockchain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id of the network this client talks to.
    fn chain_id(&self) -> u64;

    /// Executes a read-only call against `to` with the given calldata.
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, CallError>;
}

/// Production [`ChainClient`] backed by an ethers provider.
///
/// Every call is bounded by `call_timeout`; an elapsed timeout is reported
/// as [`CallError::Transport`] so callers treat it like any other
/// infrastructure failure instead of blocking the refresh cycle.
pub struct RpcChainClient<M> {
    provider: Arc<M>,
    chain_id: u64,
    call_timeout: Duration,
}

impl<M: Middleware> RpcChainClient<M> {
    pub fn new(provider: Arc<M>, chain_id: u64, call_timeout: Duration) -> Self {
        Self {
            provider,
            chain_id,
            call_timeout,
        }
    }
}

impl RpcChainClient<Provider<Http>> {
    /// Wires a client to the first configured RPC url with the configured
    /// call timeout.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings
            .rpc
            .http_urls
            .first()
            .context("rpc.http_urls is empty")?;
        let provider = Provider::<Http>::try_from(url.as_str())
            .with_context(|| format!("building rpc provider for {url}"))?;
        Ok(Self::new(
            Arc::new(provider),
            settings.chain.chain_id,
            Duration::from_secs(settings.rpc.call_timeout_seconds),
        ))
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainClient for RpcChainClient<M> {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, CallError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();

        let call = self.provider.call(&tx, None);
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => {
                // A JSON-RPC error body means the node answered and the call
                // itself failed; anything else never reached execution.
                if let Some(rpc_err) = e.as_error_response() {
                    debug!("eth_call to {to:?} reverted: {rpc_err}");
                    Err(CallError::Revert(rpc_err.to_string()))
                } else {
                    Err(CallError::Transport(e.to_string()))
                }
            }
            Err(_) => Err(CallError::Transport(format!(
                "eth_call to {to:?} timed out after {:?}",
                self.call_timeout
            ))),
        }
    }
}
