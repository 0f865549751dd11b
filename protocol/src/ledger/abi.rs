//! Word-level ABI helpers for the two token calls the hub makes and the one
//! event it reads back. A full ABI codec would be overkill for
//! `mint(address,uint256)` and `balanceOf(address)`.

use alloy_primitives::{Address, Bytes, B256, U256};

use super::{LedgerError, LedgerResult};

/// Size of one ABI word.
pub const WORD: usize = 32;

/// `bytes4(keccak256("mint(address,uint256)"))`
pub const MINT_SELECTOR: [u8; 4] = [0x40, 0xc1, 0x0f, 0x19];

/// `bytes4(keccak256("balanceOf(address)"))`
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Left-pads an address into a 32-byte word.
pub fn address_word(address: &Address) -> B256 {
    address.into_word()
}

/// Reads the address out of the low 20 bytes of a word.
pub fn word_address(word: &B256) -> Address {
    Address::from_word(*word)
}

/// Call data for `mint(to, amount)`.
pub fn encode_mint(to: &Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(4 + 2 * WORD);
    data.extend_from_slice(&MINT_SELECTOR);
    data.extend_from_slice(address_word(to).as_slice());
    data.extend_from_slice(&amount.to_be_bytes::<WORD>());
    data.into()
}

/// Call data for `balanceOf(holder)`.
pub fn encode_balance_of(holder: &Address) -> Bytes {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(address_word(holder).as_slice());
    data.into()
}

/// Decodes the first word of a call result as a `uint256`.
pub fn decode_uint(data: &[u8]) -> LedgerResult<U256> {
    if data.len() < WORD {
        return Err(LedgerError::Decode(format!(
            "expected at least {WORD} bytes of return data, got {}",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..WORD]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, keccak256};

    fn selector(signature: &str) -> [u8; 4] {
        let hash = keccak256(signature.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    #[test]
    fn selectors_match_signatures() {
        assert_eq!(selector("mint(address,uint256)"), MINT_SELECTOR);
        assert_eq!(selector("balanceOf(address)"), BALANCE_OF_SELECTOR);
    }

    #[test]
    fn mint_call_data_layout() {
        let to = address!("00000000000000000000000000000000000000aa");
        let data = encode_mint(&to, U256::from(7u64));

        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &MINT_SELECTOR);
        assert!(data[4..35].iter().all(|b| *b == 0));
        assert_eq!(data[35], 0xaa);
        assert!(data[36..67].iter().all(|b| *b == 0));
        assert_eq!(data[67], 7);
    }

    #[test]
    fn balance_of_call_data_layout() {
        let holder = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        let data = encode_balance_of(&holder);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[16..36], holder.as_slice());
    }

    #[test]
    fn address_survives_word_padding() {
        let a = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        assert_eq!(word_address(&address_word(&a)), a);
    }

    #[test]
    fn short_return_data_is_a_decode_error() {
        assert!(matches!(decode_uint(&[0u8; 31]), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn uint_decodes_big_endian() {
        let mut word = [0u8; 32];
        word[30] = 0x01;
        word[31] = 0x02;
        assert_eq!(decode_uint(&word).unwrap(), U256::from(0x0102u64));
    }
}
