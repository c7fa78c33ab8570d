//! Client side of the blockchain indexer (a GraphQL subgraph).
//!
//! - [`Subgraph`] - query interface, implemented over HTTP by [`HttpSubgraph`]
//! - [`ChainHeadResolver`] - latest safely indexed block

mod client;
mod graphql;
mod head;

pub use client::{query_as, HttpSubgraph, Subgraph};
pub use graphql::{GraphQLError, GraphQLRequest, GraphQLResponse};
pub use head::ChainHeadResolver;
