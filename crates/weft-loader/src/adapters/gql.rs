//! Native GQL interaction loader.
//!
//! Queries the content-addressed network's GQL endpoint directly, paging
//! by cursor. The network does not know about sort keys, so they are
//! derived locally from each interaction's block before the range bounds
//! are applied.

use crate::errors::LoaderError;
use crate::ports::InteractionLoader;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use weft_types::{sort_interactions, BlockRef, Interaction, SortKey, Tag, TxId};

const INTERACTIONS_QUERY: &str = r#"
query Interactions($contract: String!, $after: String) {
  transactions(
    tags: [
      { name: "App-Name", values: ["SmartWeaveAction"] }
      { name: "Contract", values: [$contract] }
    ]
    sort: HEIGHT_ASC
    first: 100
    after: $after
  ) {
    pageInfo { hasNextPage }
    edges {
      cursor
      node {
        id
        owner { address }
        recipient
        tags { name value }
        block { id height timestamp }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: GqlData,
}

#[derive(Debug, Deserialize)]
struct GqlData {
    transactions: GqlTransactions,
}

#[derive(Debug, Deserialize)]
struct GqlTransactions {
    #[serde(rename = "pageInfo")]
    page_info: GqlPageInfo,
    edges: Vec<GqlEdge>,
}

#[derive(Debug, Deserialize)]
struct GqlPageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct GqlEdge {
    cursor: String,
    node: GqlNode,
}

#[derive(Debug, Deserialize)]
struct GqlNode {
    id: String,
    owner: GqlOwner,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    tags: Vec<GqlTag>,
    // None while the transaction is still in the mempool; such
    // interactions are unordered and skipped.
    #[serde(default)]
    block: Option<GqlBlock>,
}

#[derive(Debug, Deserialize)]
struct GqlOwner {
    address: String,
}

#[derive(Debug, Deserialize)]
struct GqlTag {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GqlBlock {
    id: String,
    height: u64,
    timestamp: u64,
}

/// [`InteractionLoader`] over the network's raw GQL endpoint.
pub struct GqlInteractionLoader {
    client: Client,
    endpoint: String,
}

impl GqlInteractionLoader {
    /// Builds a loader posting to `endpoint` (e.g. `https://host/graphql`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LoaderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(LoaderError::from)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn fetch_page(
        &self,
        contract: &TxId,
        cursor: Option<&str>,
    ) -> Result<GqlTransactions, LoaderError> {
        let body = json!({
            "query": INTERACTIONS_QUERY,
            "variables": {
                "contract": contract.as_str(),
                "after": cursor,
            }
        });
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
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
        Ok(response.json::<GqlResponse>().await?.data.transactions)
    }
}

fn node_to_interaction(node: GqlNode) -> Option<Interaction> {
    let block = node.block?;
    let id = TxId::from(node.id);
    let block = BlockRef {
        height: block.height,
        id: block.id,
        timestamp: block.timestamp,
    };
    Some(Interaction {
        sort_key: Some(SortKey::derive(&block, &id)),
        id,
        block,
        owner_address: node.owner.address,
        recipient: node.recipient,
        tags: node
            .tags
            .into_iter()
            .map(|t| Tag::new(t.name, t.value))
            .collect(),
        confirmation_status: None,
        source: None,
        dry: false,
        vrf: None,
        signature: None,
    })
}

#[async_trait]
impl InteractionLoader for GqlInteractionLoader {
    async fn load(
        &self,
        contract: &TxId,
        from: Option<&SortKey>,
        to: Option<&SortKey>,
    ) -> Result<Vec<Interaction>, LoaderError> {
        let mut interactions = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.fetch_page(contract, cursor.as_deref()).await?;
            let has_next = page.page_info.has_next_page;
            cursor = page.edges.last().map(|edge| edge.cursor.clone());
            interactions.extend(page.edges.into_iter().filter_map(|e| node_to_interaction(e.node)));
            if !has_next || cursor.is_none() {
                break;
            }
        }

        let total = interactions.len();
        let bounded: Vec<Interaction> = sort_interactions(interactions)
            .into_iter()
            .filter(|i| {
                let key = i.sort_key.as_ref();
                from.map_or(true, |lower| key > Some(lower))
                    && to.map_or(true, |upper| key <= Some(upper))
            })
            .collect();
        debug!(
            contract = %contract,
            fetched = total,
            in_range = bounded.len(),
            "gql interactions loaded"
        );
        Ok(bounded)
    }
}
