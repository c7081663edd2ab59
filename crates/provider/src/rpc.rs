//! JSON-RPC state provider backed by alloy-rs.
//!
//! Field reads are `eth_call`s against no-argument getters; snapshot and
//! revert use the dev-node `evm_snapshot`/`evm_revert` extensions, which is
//! what deployment runs and scenario tests execute against.

use crate::StateProvider;
use alloy_primitives::{keccak256, Address, Bytes, TxKind};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use arachne_core::{ArachneError, ArachneResult, BuildArtifact, SnapshotId};
use async_trait::async_trait;

/// Fetches and mutates blockchain state through an Ethereum JSON-RPC endpoint.
///
/// ```ignore
/// let provider = RpcProvider::connect("http://127.0.0.1:8545").await?;
/// ```
pub struct RpcProvider {
    provider: DynProvider,
    rpc_url: String,
}

impl RpcProvider {
    pub async fn connect(rpc_url: &str) -> ArachneResult<Self> {
        url::Url::parse(rpc_url)
            .map_err(|e| ArachneError::InvalidInput(format!("bad RPC URL `{rpc_url}`: {e}")))?;

        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .map_err(|e| ArachneError::Provider(format!("Failed to connect to {rpc_url}: {e}")))?;

        tracing::info!(rpc_url, "connected");

        Ok(Self {
            provider: provider.erased(),
            rpc_url: rpc_url.to_string(),
        })
    }

    /// Returns the underlying `DynProvider`.
    pub fn into_provider(self) -> DynProvider {
        self.provider
    }

    async fn call_getter(&self, address: Address, field: &str) -> ArachneResult<Bytes> {
        let selector = keccak256(format!("{field}()").as_bytes());
        let data = Bytes::copy_from_slice(&selector[..4]);

        tracing::debug!(
            %address,
            field,
            selector = %hex::encode(&selector[..4]),
            "eth_call getter"
        );

        let tx = TransactionRequest {
            to: Some(TxKind::Call(address)),
            input: TransactionInput::new(data),
            ..Default::default()
        };

        self.provider.call(tx).await.map_err(|e| {
            ArachneError::Provider(format!("eth_call {field}() on {address:#x} failed: {e}"))
        })
    }
}

#[async_trait]
impl StateProvider for RpcProvider {
    async fn chain_id(&self) -> ArachneResult<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ArachneError::Provider(format!("chain id: {e}")))
    }

    async fn is_contract(&self, address: Address) -> ArachneResult<bool> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|e| ArachneError::Provider(format!("code at {address:#x}: {e}")))?;
        Ok(!code.is_empty())
    }

    async fn read_address_field(
        &self,
        address: Address,
        field: &str,
    ) -> ArachneResult<Vec<Address>> {
        let ret = self.call_getter(address, field).await?;
        decode_address_return(&ret)
    }

    async fn read_text_field(&self, address: Address, field: &str) -> ArachneResult<String> {
        let ret = self.call_getter(address, field).await?;
        decode_string_return(&ret)
    }

    async fn deploy_contract(
        &self,
        artifact: &BuildArtifact,
        args: &[Bytes],
    ) -> ArachneResult<Address> {
        let bytecode = artifact.bytecode.as_ref().ok_or_else(|| {
            ArachneError::InvalidInput(format!("artifact `{}` has no bytecode", artifact.contract))
        })?;

        let mut data = bytecode.to_vec();
        for arg in args {
            data.extend_from_slice(arg);
        }

        let accounts = self
            .provider
            .get_accounts()
            .await
            .map_err(|e| ArachneError::Provider(format!("accounts: {e}")))?;
        let from = *accounts.first().ok_or_else(|| {
            ArachneError::Provider(format!("{}: node exposes no accounts", self.rpc_url))
        })?;

        let tx = TransactionRequest {
            from: Some(from),
            to: Some(TxKind::Create),
            input: TransactionInput::new(data.into()),
            ..Default::default()
        };

        let receipt = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ArachneError::Provider(format!("deploy {}: {e}", artifact.contract)))?
            .get_receipt()
            .await
            .map_err(|e| {
                ArachneError::Provider(format!("deploy receipt {}: {e}", artifact.contract))
            })?;

        let address = receipt.contract_address.ok_or_else(|| {
            ArachneError::Provider(format!(
                "deploy of {} produced no contract address",
                artifact.contract
            ))
        })?;

        tracing::info!(%address, contract = %artifact.contract, "deployed");
        Ok(address)
    }

    async fn snapshot(&self) -> ArachneResult<SnapshotId> {
        let id: String = self
            .provider
            .raw_request("evm_snapshot".into(), Vec::<String>::new())
            .await
            .map_err(|e| ArachneError::Provider(format!("evm_snapshot: {e}")))?;
        Ok(SnapshotId(id))
    }

    async fn revert(&self, snapshot: &SnapshotId) -> ArachneResult<bool> {
        self.provider
            .raw_request("evm_revert".into(), (snapshot.0.clone(),))
            .await
            .map_err(|e| ArachneError::Provider(format!("evm_revert {snapshot}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Minimal ABI return decoding
// ---------------------------------------------------------------------------

const WORD: usize = 32;

fn word(data: &[u8], i: usize) -> ArachneResult<&[u8]> {
    data.get(i * WORD..(i + 1) * WORD)
        .ok_or_else(|| ArachneError::Provider(format!("return data truncated at word {i}")))
}

fn word_as_usize(w: &[u8]) -> ArachneResult<usize> {
    if w[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(ArachneError::Provider("oversized length word".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&w[WORD - 8..]);
    Ok(u64::from_be_bytes(buf) as usize)
}

fn word_as_address(w: &[u8]) -> Address {
    Address::from_slice(&w[WORD - 20..])
}

/// Decode `address` or `address[]` return data.
fn decode_address_return(data: &[u8]) -> ArachneResult<Vec<Address>> {
    if data.is_empty() {
        return Err(ArachneError::Provider("empty return data".into()));
    }
    if data.len() == WORD {
        return Ok(vec![word_as_address(word(data, 0)?)]);
    }

    // Dynamic array: head word is the tail offset, then length + elements.
    let offset = word_as_usize(word(data, 0)?)? / WORD;
    let len = word_as_usize(word(data, offset)?)?;
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(word_as_address(word(data, offset + 1 + i)?));
    }
    Ok(out)
}

/// Decode `string` return data.
fn decode_string_return(data: &[u8]) -> ArachneResult<String> {
    let offset = word_as_usize(word(data, 0)?)?;
    let len = word_as_usize(word(data, offset / WORD)?)?;
    let start = offset + WORD;
    let bytes = data
        .get(start..start + len)
        .ok_or_else(|| ArachneError::Provider("string return truncated".into()))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ArachneError::Provider(format!("non-utf8 string return: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr_word(address: Address) -> Vec<u8> {
        let mut w = vec![0u8; WORD];
        w[WORD - 20..].copy_from_slice(address.as_slice());
        w
    }

    fn usize_word(n: usize) -> Vec<u8> {
        let mut w = vec![0u8; WORD];
        w[WORD - 8..].copy_from_slice(&(n as u64).to_be_bytes());
        w
    }

    #[test]
    fn decodes_single_address() {
        let a = MockAddr::nth(7);
        let out = decode_address_return(&addr_word(a)).unwrap();
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn decodes_address_array() {
        let a = MockAddr::nth(1);
        let b = MockAddr::nth(2);
        let mut data = usize_word(WORD); // offset
        data.extend(usize_word(2)); // length
        data.extend(addr_word(a));
        data.extend(addr_word(b));

        assert_eq!(decode_address_return(&data).unwrap(), vec![a, b]);
    }

    #[test]
    fn decodes_empty_array() {
        let mut data = usize_word(WORD);
        data.extend(usize_word(0));
        assert!(decode_address_return(&data).unwrap().is_empty());
    }

    #[test]
    fn decodes_string() {
        let s = "Comet USDC";
        let mut data = usize_word(WORD);
        data.extend(usize_word(s.len()));
        let mut tail = s.as_bytes().to_vec();
        tail.resize(WORD, 0);
        data.extend(tail);

        assert_eq!(decode_string_return(&data).unwrap(), s);
    }

    #[test]
    fn truncated_return_is_an_error() {
        assert!(decode_address_return(&[0u8; 16]).is_err());
        assert!(decode_string_return(&usize_word(WORD)).is_err());
    }

    struct MockAddr;
    impl MockAddr {
        fn nth(n: u64) -> Address {
            let mut bytes = [0u8; 20];
            bytes[12..].copy_from_slice(&n.to_be_bytes());
            Address::from(bytes)
        }
    }
}
