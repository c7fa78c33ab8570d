mod lease;
mod token;

pub use lease::{
    BlockScanLease, LeaseStatus, HEARTBEAT_ERRORED, HEARTBEAT_IDLE, LEASE_KEY_PREFIX,
};
pub use token::{Token, TokenContract, TokenOwner, TOKEN_KEY_PREFIX};

/// Key of the global progress cursor in the scan namespace.
pub const CURSOR_KEY: &str = "eip-721:head";
