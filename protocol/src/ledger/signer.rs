//! # Operator Key
//!
//! The hub signs two kinds of transactions with one secp256k1 key: `mint`
//! calls against the token contract, and plain value transfers from the
//! faucet. Both go out as EIP-155 legacy transactions, which is the lowest
//! common denominator every EVM node accepts.
//!
//! ## Security considerations
//!
//! - Key bytes are never logged and `Debug` prints only the address.
//! - Signatures are RFC 6979 deterministic and low-S normalized, so the
//!   same transaction always yields the same hash.

use std::fmt;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, Header};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use super::{LedgerError, LedgerResult};

/// Derives the Ethereum address of a public key: the low 20 bytes of the
/// keccak hash of the uncompressed point without its `0x04` tag.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.as_affine().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

// ---------------------------------------------------------------------------
// OperatorKey
// ---------------------------------------------------------------------------

/// The operator's signing key together with its derived address.
#[derive(Clone)]
pub struct OperatorKey {
    key: SigningKey,
    address: Address,
}

impl OperatorKey {
    /// Loads a key from its 32 raw secret bytes.
    pub fn from_bytes(bytes: &[u8]) -> LedgerResult<Self> {
        let key = SigningKey::from_slice(bytes)
            .map_err(|_| LedgerError::Signing("invalid secp256k1 secret key".into()))?;
        Ok(Self::from_signing_key(key))
    }

    /// Loads a key from hex, with or without a `0x` prefix.
    pub fn from_hex(hex_key: &str) -> LedgerResult<Self> {
        let trimmed = hex_key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|_| LedgerError::Signing("operator key is not valid hex".into()))?;
        Self::from_bytes(&bytes)
    }

    /// Generates a fresh key from OS entropy.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Secret bytes as `0x`-prefixed hex. Only the `keygen` command should
    /// ever call this.
    pub fn secret_hex(&self) -> String {
        format!("0x{}", hex::encode(self.key.to_bytes()))
    }

    /// Signs `tx` and returns its network encoding.
    pub fn sign_legacy(&self, tx: &LegacyTx) -> LedgerResult<SignedTx> {
        let sighash = tx.signing_hash();
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(sighash.as_slice())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;

        let rs = signature.to_bytes();
        let r = U256::from_be_slice(&rs[..32]);
        let s = U256::from_be_slice(&rs[32..]);
        let v = u64::from(recovery_id.to_byte()) + tx.chain_id * 2 + 35;

        let raw = tx.encode_signed(v, r, s);
        Ok(SignedTx {
            hash: keccak256(&raw),
            raw: raw.into(),
        })
    }
}

impl fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Legacy transactions
// ---------------------------------------------------------------------------

/// An unsigned pre-EIP-1559 transaction bound to a chain (EIP-155).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub hash: B256,
    pub raw: Bytes,
}

impl LegacyTx {
    fn base_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.input.length()
    }

    fn encode_base(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
    }

    /// RLP of `[nonce, gasPrice, gas, to, value, input, chainId, 0, 0]`.
    pub fn encode_for_signing(&self) -> Vec<u8> {
        let payload_length = self.base_length() + self.chain_id.length() + 2 * 0u8.length();
        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_base(&mut out);
        self.chain_id.encode(&mut out);
        0u8.encode(&mut out);
        0u8.encode(&mut out);
        out
    }

    /// Keccak hash of [`Self::encode_for_signing`].
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.encode_for_signing())
    }

    /// RLP of `[nonce, gasPrice, gas, to, value, input, v, r, s]`.
    fn encode_signed(&self, v: u64, r: U256, s: U256) -> Vec<u8> {
        let payload_length = self.base_length() + v.length() + r.length() + s.length();
        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_base(&mut out);
        v.encode(&mut out);
        r.encode(&mut out);
        s.encode(&mut out);
        out
    }
}
