use crate::config::LookupConfig;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup backend answered {0}")]
    Status(u16),
}

/// One player record as served by the lookup backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerRecord {
    pub guid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// Remote directory keyed by player GUID.
pub struct PlayerDirectory {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl PlayerDirectory {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, endpoint: config.endpoint.clone(), api_key: config.api_key.clone() })
    }

    pub async fn fetch(&self, guid: &str) -> Result<PlayerRecord, LookupError> {
        let url = self.endpoint.replace("{guid}", guid);
        debug!("lookup.event=fetch guid={guid}");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }
        Ok(response.json::<PlayerRecord>().await?)
    }
}
