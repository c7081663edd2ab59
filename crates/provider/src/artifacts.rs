//! Remote build-artifact source.
//!
//! Fetches verifier-published artifacts (`{ contractName, abi }`) over HTTP
//! and distills them to the method-name capability set the crawler needs.

use crate::ArtifactSource;
use alloy_primitives::Address;
use arachne_core::{ArachneError, ArachneResult, BuildArtifact};
use async_trait::async_trait;
use serde::Deserialize;

pub struct HttpArtifactSource {
    base: url::Url,
    client: reqwest::Client,
}

impl HttpArtifactSource {
    pub fn new(base_url: &str) -> ArachneResult<Self> {
        let base = url::Url::parse(base_url).map_err(|e| {
            ArachneError::InvalidInput(format!("bad artifact URL `{base_url}`: {e}"))
        })?;
        Ok(Self {
            base,
            client: reqwest::Client::new(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RemoteArtifact {
    #[serde(rename = "contractName")]
    contract_name: String,
    #[serde(default)]
    abi: Vec<AbiEntry>,
}

#[derive(Debug, Deserialize)]
struct AbiEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
}

impl RemoteArtifact {
    fn distill(self) -> BuildArtifact {
        let methods = self
            .abi
            .into_iter()
            .filter(|e| e.kind == "function")
            .filter_map(|e| e.name)
            .collect();
        BuildArtifact {
            contract: self.contract_name,
            methods,
            bytecode: None,
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn artifact_for(
        &self,
        network: &str,
        address: Address,
    ) -> ArachneResult<Option<BuildArtifact>> {
        let url = self
            .base
            .join(&format!("{network}/{address:#x}.json"))
            .map_err(|e| ArachneError::Internal(format!("artifact URL join: {e}")))?;

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ArachneError::Provider(format!("artifact fetch {url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(%address, network, "no remote artifact");
            return Ok(None);
        }

        let remote: RemoteArtifact = resp
            .error_for_status()
            .map_err(|e| ArachneError::Provider(format!("artifact fetch {url}: {e}")))?
            .json()
            .await
            .map_err(|e| ArachneError::Provider(format!("artifact body {url}: {e}")))?;

        tracing::debug!(%address, contract = %remote.contract_name, "fetched artifact");
        Ok(Some(remote.distill()))
    }
}
