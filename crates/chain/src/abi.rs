//! Word-level ABI codec.
//!
//! The coordinator decodes a fixed set of registry getters and event
//! payloads: static words, one dynamic `string`/`bytes` tail, and the
//! multicall `aggregate` tuple array. Anything richer belongs upstream in
//! the contract bindings.

use sha3::{Digest, Keccak256};

use provenet_core::{Address, Hash32};

use crate::{ChainError, Result};

const WORD: usize = 32;

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Topic hash of a canonical event signature.
pub fn event_topic(signature: &str) -> Hash32 {
    keccak256(signature.as_bytes())
}

/// 4-byte function selector of a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Encode a u64 as a left-padded 32-byte word.
pub fn encode_u64(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Calldata for a getter taking a single uint256 argument.
pub fn encode_call_u64(signature: &str, argument: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&encode_u64(argument));
    data
}

/// Calldata for a getter taking no arguments.
pub fn encode_call(signature: &str) -> Vec<u8> {
    selector(signature).to_vec()
}

fn word(data: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * WORD;
    data.get(start..start + WORD)
        .ok_or_else(|| ChainError::Abi(format!("missing word {} in {}-byte payload", index, data.len())))
}

/// Decode the word at `index` as a u64, rejecting values that overflow.
pub fn decode_u64(data: &[u8], index: usize) -> Result<u64> {
    let w = word(data, index)?;
    if w[..WORD - 8].iter().any(|&b| b != 0) {
        return Err(ChainError::Abi(format!("uint256 at word {} overflows u64", index)));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&w[WORD - 8..]);
    Ok(u64::from_be_bytes(bytes))
}

/// Decode the word at `index` as a bool.
pub fn decode_bool(data: &[u8], index: usize) -> Result<bool> {
    Ok(decode_u64(data, index)? != 0)
}

/// Decode the word at `index` as a right-aligned 20-byte address.
pub fn decode_address(data: &[u8], index: usize) -> Result<Address> {
    let w = word(data, index)?;
    let mut address = [0u8; 20];
    address.copy_from_slice(&w[WORD - 20..]);
    Ok(address)
}

/// Decode the word at `index` as a bytes32 value.
pub fn decode_b32(data: &[u8], index: usize) -> Result<Hash32> {
    let w = word(data, index)?;
    let mut value = [0u8; 32];
    value.copy_from_slice(w);
    Ok(value)
}

/// Decode a dynamic `bytes` field whose offset word sits at `index`.
pub fn decode_dyn_bytes(data: &[u8], index: usize) -> Result<Vec<u8>> {
    let offset = decode_u64(data, index)? as usize;
    let tail = data
        .get(offset..)
        .ok_or_else(|| ChainError::Abi(format!("bytes at offset {} out of range", offset)))?;
    let length = decode_u64(tail, 0)? as usize;
    tail.get(WORD..WORD + length)
        .map(|bytes| bytes.to_vec())
        .ok_or_else(|| ChainError::Abi(format!("bytes at offset {} out of range", offset)))
}

/// Decode a dynamic `string` field whose offset word sits at `index`.
pub fn decode_dyn_string(data: &[u8], index: usize) -> Result<String> {
    let bytes = decode_dyn_bytes(data, index)?;
    String::from_utf8(bytes).map_err(|e| ChainError::Abi(format!("invalid utf8 string: {}", e)))
}

fn pad_length(length: usize) -> usize {
    length.div_ceil(WORD) * WORD
}

/// Encode calldata for multicall `aggregate((address,bytes)[])`.
pub fn encode_aggregate(calls: &[(Address, Vec<u8>)]) -> Vec<u8> {
    let mut data = selector("aggregate((address,bytes)[])").to_vec();
    data.extend_from_slice(&encode_u64(WORD as u64));
    data.extend_from_slice(&encode_u64(calls.len() as u64));

    // Element offsets are relative to the start of the element area.
    let mut offset = calls.len() * WORD;
    let mut tail = Vec::new();
    for (target, calldata) in calls {
        data.extend_from_slice(&encode_u64(offset as u64));

        let mut element = Vec::new();
        let mut target_word = [0u8; WORD];
        target_word[WORD - 20..].copy_from_slice(target);
        element.extend_from_slice(&target_word);
        element.extend_from_slice(&encode_u64(2 * WORD as u64));
        element.extend_from_slice(&encode_u64(calldata.len() as u64));
        element.extend_from_slice(calldata);
        element.resize(3 * WORD + pad_length(calldata.len()), 0);

        offset += element.len();
        tail.extend_from_slice(&element);
    }
    data.extend_from_slice(&tail);
    data
}

/// Decode the multicall `aggregate` return value:
/// `(uint256 blockNumber, bytes[] returnData)`.
pub fn decode_aggregate(data: &[u8]) -> Result<(u64, Vec<Vec<u8>>)> {
    let block_number = decode_u64(data, 0)?;
    let array_offset = decode_u64(data, 1)? as usize;
    let array = data
        .get(array_offset..)
        .ok_or_else(|| ChainError::Abi("aggregate return array out of range".to_string()))?;
    let count = decode_u64(array, 0)? as usize;
    let elements = array
        .get(WORD..)
        .ok_or_else(|| ChainError::Abi("aggregate return array out of range".to_string()))?;

    let mut results = Vec::with_capacity(count);
    for i in 0..count {
        let offset = decode_u64(elements, i)? as usize;
        let tail = elements
            .get(offset..)
            .ok_or_else(|| ChainError::Abi(format!("aggregate result {} out of range", i)))?;
        let length = decode_u64(tail, 0)? as usize;
        let bytes = tail
            .get(WORD..WORD + length)
            .ok_or_else(|| ChainError::Abi(format!("aggregate result {} out of range", i)))?;
        results.push(bytes.to_vec());
    }
    Ok((block_number, results))
}
