//! Remote gateway interaction loader.
//!
//! Pages through `GET {base}/gateway/interactions-sort-key` until
//! `page == paging.pages`, merging pages in order. Any non-2xx response or
//! transport failure aborts the whole load.

use crate::errors::LoaderError;
use crate::ports::InteractionLoader;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use weft_types::{
    BlockRef, ConfirmationStatus, Interaction, InteractionSource, SortKey, Tag, TxId, VrfData,
};

/// Server-side confirmation filter for loaded interactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfirmationFilter {
    /// Only gateway-confirmed interactions.
    Confirmed,
    /// Everything except corrupted interactions.
    NotCorrupted,
    /// No filter.
    #[default]
    Any,
}

impl ConfirmationFilter {
    fn query_value(self) -> Option<&'static str> {
        match self {
            Self::Confirmed => Some("confirmed"),
            Self::NotCorrupted => Some("not_corrupted"),
            Self::Any => None,
        }
    }
}

/// Server-side source filter for loaded interactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceFilter {
    /// Only base-layer interactions.
    Native,
    /// Only sequencer interactions.
    Sequencer,
    /// No filter.
    #[default]
    Any,
}

impl SourceFilter {
    fn query_value(self) -> Option<&'static str> {
        match self {
            Self::Native => Some("native"),
            Self::Sequencer => Some("sequencer"),
            Self::Any => None,
        }
    }
}

// Wire format of the gateway response.

#[derive(Debug, Deserialize)]
struct GatewayPage {
    paging: GatewayPaging,
    interactions: Vec<GatewayEntry>,
}

#[derive(Debug, Deserialize)]
struct GatewayPaging {
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct GatewayEntry {
    interaction: WireInteraction,
    #[serde(default)]
    status: Option<ConfirmationStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInteraction {
    id: String,
    sort_key: String,
    block: WireBlock,
    owner: WireOwner,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    tags: Vec<WireTag>,
    #[serde(default)]
    source: Option<InteractionSource>,
    #[serde(default)]
    vrf: Option<VrfData>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    height: u64,
    id: String,
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct WireOwner {
    address: String,
}

#[derive(Debug, Deserialize)]
struct WireTag {
    name: String,
    value: String,
}

impl GatewayEntry {
    fn into_interaction(self) -> Interaction {
        let WireInteraction {
            id,
            sort_key,
            block,
            owner,
            recipient,
            tags,
            source,
            vrf,
        } = self.interaction;
        Interaction {
            id: TxId::from(id),
            sort_key: Some(SortKey::new(sort_key)),
            block: BlockRef {
                height: block.height,
                id: block.id,
                timestamp: block.timestamp,
            },
            owner_address: owner.address,
            recipient,
            tags: tags.into_iter().map(|t| Tag::new(t.name, t.value)).collect(),
            confirmation_status: self.status,
            source,
            dry: false,
            vrf,
            signature: None,
        }
    }
}

/// [`InteractionLoader`] backed by the protocol gateway.
pub struct GatewayInteractionLoader {
    client: Client,
    base_url: String,
    confirmation: ConfirmationFilter,
    source: SourceFilter,
}

impl GatewayInteractionLoader {
    /// Builds a loader against `base_url` with the given filters.
    pub fn new(
        base_url: impl Into<String>,
        confirmation: ConfirmationFilter,
        source: SourceFilter,
    ) -> Result<Self, LoaderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(LoaderError::from)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            confirmation,
            source,
        })
    }

    async fn fetch_page(
        &self,
        contract: &TxId,
        from: Option<&SortKey>,
        to: Option<&SortKey>,
        page: u32,
    ) -> Result<GatewayPage, LoaderError> {
        let url = format!("{}/gateway/interactions-sort-key", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("contractId", contract.to_string()),
            ("page", page.to_string()),
            ("minimize", "true".to_string()),
        ];
        if let Some(from) = from {
            query.push(("from", from.to_string()));
        }
        if let Some(to) = to {
            query.push(("to", to.to_string()));
        }
        if let Some(filter) = self.confirmation.query_value() {
            query.push(("confirmationStatus", filter.to_string()));
        }
        if let Some(filter) = self.source.query_value() {
            query.push(("source", filter.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(LoaderError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<GatewayPage>().await?)
    }
}

#[async_trait]
impl InteractionLoader for GatewayInteractionLoader {
    async fn load(
        &self,
        contract: &TxId,
        from: Option<&SortKey>,
        to: Option<&SortKey>,
    ) -> Result<Vec<Interaction>, LoaderError> {
        let mut interactions = Vec::new();
        let mut page = 1;
        loop {
            let response = self.fetch_page(contract, from, to, page).await?;
            let pages = response.paging.pages;
            interactions.extend(
                response
                    .interactions
                    .into_iter()
                    .map(GatewayEntry::into_interaction),
            );
            if page >= pages {
                break;
            }
            page += 1;
        }
        debug!(
            contract = %contract,
            loaded = interactions.len(),
            pages = page,
            "gateway interactions loaded"
        );
        Ok(interactions)
    }
}
