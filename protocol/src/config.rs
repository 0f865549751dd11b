//! # Protocol Configuration & Constants
//!
//! Every magic number the hub relies on lives here. These are the reference
//! deployment's values; [`crate::hub::HubConfig`] copies them into an
//! immutable value at construction so nothing downstream reads a global.

use std::time::Duration;

use alloy_primitives::{address, b256, Address, B256, U256};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Library version string, reported by the node's `version` subcommand.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Ledger Identity
// ---------------------------------------------------------------------------

/// Chain ID of the RSS3 VSL testnet the reference deployment runs on.
pub const DEFAULT_CHAIN_ID: u64 = 2331;

/// Default JSON-RPC endpoint for that chain.
pub const DEFAULT_RPC_ENDPOINT: &str = "https://rpc.testnet.rss3.io";

/// The deployed reward token (an ERC-20 with an operator-gated `mint`).
pub const TOKEN_CONTRACT: Address = address!("E26CFDE633A7be6714e58b44F2eA5Af8Ef080378");

/// `keccak256("Transfer(address,address,uint256)")`, the ERC-20 transfer
/// event topic. Burns show up as transfers to [`BURN_ADDRESS`].
pub const TRANSFER_EVENT_SIGNATURE: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// The null address. Tokens sent here are gone for good.
pub const BURN_ADDRESS: Address = Address::ZERO;

/// Gas limit for `mint` calls.
pub const MINT_GAS_LIMIT: u64 = 300_000;

/// Gas limit for a plain value transfer. Exactly the intrinsic cost.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// How often the RPC ledger polls for a receipt while waiting on a mint.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Decimals of both the reward token and the native currency.
pub const TOKEN_DECIMALS: u8 = 18;

/// Base mint for a knock without a note: one whole token.
pub const BASE_MINT_UNITS: u64 = 1;

/// Lower bound (inclusive) of the boosted mint for a knock with a note.
pub const BOOST_MIN_UNITS: u64 = 5;

/// Upper bound (inclusive) of the boosted mint.
pub const BOOST_MAX_UNITS: u64 = 10;

/// Tokens a client must burn to peek at a note.
pub const PEEK_PRICE_UNITS: u64 = 10;

/// Faucet grant in native-currency milli-units: 0.5 of a coin.
pub const FAUCET_MILLI_UNITS: u64 = 500;

/// Maximum note or reply length in bytes. Enough for a thought, not
/// enough for a manifesto.
pub const MAX_NOTE_LENGTH: usize = 512;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Per-address knock cooldown.
pub const KNOCK_COOLDOWN: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// One whole unit (10^decimals) in the smallest denomination.
pub fn unit() -> U256 {
    U256::from(10u64).pow(U256::from(TOKEN_DECIMALS))
}

/// `units` whole tokens in the smallest denomination.
pub fn units(units: u64) -> U256 {
    U256::from(units) * unit()
}

/// `milli` thousandths of a unit in the smallest denomination.
pub fn milli_units(milli: u64) -> U256 {
    U256::from(milli) * unit() / U256::from(1_000u64)
}
