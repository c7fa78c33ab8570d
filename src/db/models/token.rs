use serde::{Deserialize, Serialize};

pub const TOKEN_KEY_PREFIX: &str = "eip-721:token:";

/// EIP-721 token as reported by the subgraph (`eip-721:token:<id>`).
///
/// Numeric fields stay strings: the subgraph encodes `BigInt` as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    #[serde(rename = "tokenID")]
    pub token_id: String,
    #[serde(rename = "tokenURI")]
    pub token_uri: String,
    pub mint_time: String,
    pub block_number: String,
    pub block_hash: String,
    pub contract: TokenContract,
    pub owner: TokenOwner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenContract {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(rename = "supportsEIP721Metadata", default)]
    pub supports_eip721_metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenOwner {
    pub id: String,
}

impl Token {
    pub fn key(&self) -> String {
        format!("{}{}", TOKEN_KEY_PREFIX, self.id)
    }
}
