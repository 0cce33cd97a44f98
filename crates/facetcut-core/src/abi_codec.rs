//! # Calldata Codec
//!
//! Adapters between plan arguments, routing-table queries and the
//! contract ABI encoding of `alloy-dyn-abi`.
//!
//! Plan arguments are JSON scalars or lists. Scalars are coerced with
//! [`DynSolType::coerce_str`]; lists map onto arrays and tuples element by
//! element, so initializers such as
//! `initialize(bytes32,address[],bytes[],bool)` take their arguments
//! straight from a plan file.

use crate::error::FacetError;
use crate::primitives::{SELECTOR_LEN, Selector};
use crate::signature::FunctionSignature;
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// An initializer argument as written in a plan file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitArg {
    Bool(bool),
    Number(u64),
    Text(String),
    /// Elements of an array or members of a tuple.
    List(Vec<InitArg>),
}

impl From<&str> for InitArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for InitArg {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for InitArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Address> for InitArg {
    fn from(value: Address) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<InitArg>> From<Vec<T>> for InitArg {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// CALL ENCODING
// =============================================================================

/// Encode a call: selector followed by the ABI-encoded arguments.
pub fn encode_call(signature: &FunctionSignature, args: &[InitArg]) -> Result<Vec<u8>, FacetError> {
    let params = signature.params();
    if params.len() != args.len() {
        return Err(FacetError::ArgumentCount {
            signature: signature.canonical(),
            expected: params.len(),
            actual: args.len(),
        });
    }

    let values = params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (ty, arg))| {
            coerce(ty, arg).map_err(|reason| FacetError::InvalidArgument {
                signature: signature.canonical(),
                index,
                reason,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = signature.selector().as_bytes().to_vec();
    out.extend(DynSolValue::Tuple(values).abi_encode_params());
    Ok(out)
}

fn coerce(ty: &DynSolType, arg: &InitArg) -> Result<DynSolValue, String> {
    let items = match arg {
        InitArg::List(items) => items,
        InitArg::Bool(b) => return coerce_scalar(ty, &b.to_string()),
        InitArg::Number(n) => return coerce_scalar(ty, &n.to_string()),
        InitArg::Text(text) => return coerce_scalar(ty, text),
    };
    let elements = |inner: &DynSolType| {
        items
            .iter()
            .map(|item| coerce(inner, item))
            .collect::<Result<Vec<_>, _>>()
    };
    let expect_len = |len: usize| {
        if items.len() == len {
            Ok(())
        } else {
            Err(format!(
                "{} expects {len} element(s), got {}",
                ty.sol_type_name(),
                items.len()
            ))
        }
    };

    match ty {
        DynSolType::Array(inner) => elements(inner.as_ref()).map(DynSolValue::Array),
        DynSolType::FixedArray(inner, len) => {
            expect_len(*len)?;
            elements(inner.as_ref()).map(DynSolValue::FixedArray)
        }
        DynSolType::Tuple(members) => {
            expect_len(members.len())?;
            members
                .iter()
                .zip(items)
                .map(|(member, item)| coerce(member, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        }
        other => Err(format!("{} does not take a list", other.sol_type_name())),
    }
}

fn coerce_scalar(ty: &DynSolType, text: &str) -> Result<DynSolValue, String> {
    ty.coerce_str(text)
        .map_err(|e| format!("`{text}` is not a valid {}: {e}", ty.sol_type_name()))
}

// =============================================================================
// ROUTING QUERIES
// =============================================================================

fn bytes4(selector: Selector) -> DynSolValue {
    let mut word = B256::ZERO;
    word[..SELECTOR_LEN].copy_from_slice(selector.as_bytes());
    DynSolValue::FixedBytes(word, SELECTOR_LEN)
}

fn encode_single(value: DynSolValue) -> Vec<u8> {
    DynSolValue::Tuple(vec![value]).abi_encode_params()
}

/// Encode a single `address` argument or return value.
#[must_use]
pub fn encode_address(address: Address) -> Vec<u8> {
    encode_single(DynSolValue::Address(address))
}

/// Encode a single `bytes4` argument or return value.
#[must_use]
pub fn encode_selector(selector: Selector) -> Vec<u8> {
    encode_single(bytes4(selector))
}

/// Encode a single `address[]` return value.
#[must_use]
pub fn encode_address_array(addresses: &[Address]) -> Vec<u8> {
    encode_single(DynSolValue::Array(
        addresses.iter().copied().map(DynSolValue::Address).collect(),
    ))
}

/// Encode a single `bytes4[]` return value.
#[must_use]
pub fn encode_selector_array(selectors: &[Selector]) -> Vec<u8> {
    encode_single(DynSolValue::Array(
        selectors.iter().copied().map(bytes4).collect(),
    ))
}

fn decode_single(ty: DynSolType, data: &[u8]) -> Result<DynSolValue, FacetError> {
    let decoded = DynSolType::Tuple(vec![ty])
        .abi_decode_params(data)
        .map_err(|e| FacetError::MalformedReturnData(e.to_string()))?;
    match decoded {
        DynSolValue::Tuple(mut values) if values.len() == 1 => Ok(values.remove(0)),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(value: &DynSolValue) -> FacetError {
    FacetError::MalformedReturnData(format!("unexpected value {value:?}"))
}

fn as_address(value: DynSolValue) -> Result<Address, FacetError> {
    match value {
        DynSolValue::Address(address) => Ok(address),
        other => Err(unexpected(&other)),
    }
}

fn as_selector(value: DynSolValue) -> Result<Selector, FacetError> {
    match value {
        DynSolValue::FixedBytes(word, SELECTOR_LEN) => {
            let mut raw = [0u8; SELECTOR_LEN];
            raw.copy_from_slice(&word[..SELECTOR_LEN]);
            Ok(Selector(raw))
        }
        other => Err(unexpected(&other)),
    }
}

fn as_array(value: DynSolValue) -> Result<Vec<DynSolValue>, FacetError> {
    match value {
        DynSolValue::Array(values) => Ok(values),
        other => Err(unexpected(&other)),
    }
}

/// Decode a single `address` value.
pub fn decode_address(data: &[u8]) -> Result<Address, FacetError> {
    as_address(decode_single(DynSolType::Address, data)?)
}

/// Decode a single `bytes4` value.
pub fn decode_selector(data: &[u8]) -> Result<Selector, FacetError> {
    as_selector(decode_single(DynSolType::FixedBytes(SELECTOR_LEN), data)?)
}

/// Decode a single `address[]` return value.
pub fn decode_address_array(data: &[u8]) -> Result<Vec<Address>, FacetError> {
    let ty = DynSolType::Array(Box::new(DynSolType::Address));
    as_array(decode_single(ty, data)?)?
        .into_iter()
        .map(as_address)
        .collect()
}

/// Decode a single `bytes4[]` return value.
pub fn decode_selector_array(data: &[u8]) -> Result<Vec<Selector>, FacetError> {
    let ty = DynSolType::Array(Box::new(DynSolType::FixedBytes(SELECTOR_LEN)));
    as_array(decode_single(ty, data)?)?
        .into_iter()
        .map(as_selector)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    const WORD: usize = 32;

    fn sig(s: &str) -> FunctionSignature {
        FunctionSignature::parse(s).unwrap()
    }

    fn uint_word(value: U256) -> [u8; WORD] {
        value.to_be_bytes::<WORD>()
    }

    #[test]
    fn no_argument_call_is_just_the_selector() {
        let data = encode_call(&sig("initialize()"), &[]).unwrap();
        assert_eq!(data, sig("initialize()").selector().as_bytes().to_vec());
    }

    #[test]
    fn static_arguments_fill_words() {
        let token = Address::repeat_byte(0xab);
        let data = encode_call(
            &sig("initialize(address,uint256,bool)"),
            &[token.into(), 42u64.into(), true.into()],
        )
        .unwrap();
        assert_eq!(data.len(), 4 + 3 * WORD);
        assert_eq!(&data[4 + 12..4 + WORD], token.as_slice());
        assert_eq!(data[4 + 2 * WORD - 1], 42);
        assert_eq!(data[4 + 3 * WORD - 1], 1);
    }

    #[test]
    fn dynamic_string_goes_to_tail() {
        let data = encode_call(&sig("initialize(string,uint8)"), &["hello".into(), 7u64.into()])
            .unwrap();
        let body = &data[4..];
        // offset of the string is past the two head words
        assert_eq!(body[WORD - 1], 64);
        assert_eq!(body[2 * WORD - 1], 7);
        assert_eq!(body[3 * WORD - 1], 5);
        assert_eq!(&body[3 * WORD..3 * WORD + 5], b"hello");
        assert_eq!(body.len(), 4 * WORD);
    }

    #[test]
    fn arrays_take_lists() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let data = encode_call(
            &sig("initialize(bytes32,address[],bytes[],bool)"),
            &[
                format!("0x{}", "11".repeat(32)).as_str().into(),
                vec![a, b].into(),
                vec!["0x01", "0x0203"].into(),
                false.into(),
            ],
        )
        .unwrap();
        let body = &data[4..];
        assert_eq!(&body[..WORD], &[0x11; WORD]);
        // address[] offset, then its length and elements in the tail
        let offset = usize::from(body[2 * WORD - 1]);
        assert_eq!(offset, 4 * WORD);
        assert_eq!(body[offset + WORD - 1], 2);
        assert_eq!(&body[offset + WORD + 12..offset + 2 * WORD], a.as_slice());
        assert_eq!(&body[offset + 2 * WORD + 12..offset + 3 * WORD], b.as_slice());
    }

    #[test]
    fn list_length_and_shape_are_checked() {
        assert!(matches!(
            encode_call(&sig("f(uint8[2])"), &[vec![1u64].into()]),
            Err(FacetError::InvalidArgument { index: 0, .. })
        ));
        let pair = InitArg::List(vec![1u64.into(), true.into()]);
        assert!(encode_call(&sig("f((uint8,bool))"), &[pair]).is_ok());
        assert!(encode_call(&sig("f(uint8)"), &[vec![1u64].into()]).is_err());
    }

    #[test]
    fn negative_int_is_twos_complement() {
        let data = encode_call(&sig("f(int8)"), &["-1".into()]).unwrap();
        assert!(data[4..].iter().all(|b| *b == 0xff));
        assert!(encode_call(&sig("f(int8)"), &["-129".into()]).is_err());
        assert!(encode_call(&sig("f(int8)"), &[128u64.into()]).is_err());
    }

    #[test]
    fn arity_and_type_mismatches_are_rejected() {
        assert!(matches!(
            encode_call(&sig("f(address)"), &[]),
            Err(FacetError::ArgumentCount { expected: 1, actual: 0, .. })
        ));
        assert!(matches!(
            encode_call(&sig("f(address)"), &[true.into()]),
            Err(FacetError::InvalidArgument { index: 0, .. })
        ));
        assert!(encode_call(&sig("f(uint8)"), &[256u64.into()]).is_err());
    }

    #[test]
    fn query_values_decode() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        assert_eq!(decode_address_array(&encode_address_array(&[a, b])).unwrap(), vec![a, b]);
        assert_eq!(decode_address(&encode_address(a)).unwrap(), a);

        let s = sig("x()").selector();
        assert_eq!(decode_selector_array(&encode_selector_array(&[s])).unwrap(), vec![s]);
        assert_eq!(decode_selector(&encode_selector(s)).unwrap(), s);
    }

    #[test]
    fn truncated_data_is_malformed() {
        assert!(matches!(
            decode_address(&[0u8; 8]),
            Err(FacetError::MalformedReturnData(_))
        ));
    }

    #[test]
    fn huge_offset_is_malformed() {
        let data = uint_word(U256::from(usize::MAX - 4));
        assert!(matches!(
            decode_address_array(&data),
            Err(FacetError::MalformedReturnData(_))
        ));
        let mut pointing_past_end = uint_word(U256::from(WORD)).to_vec();
        pointing_past_end.extend_from_slice(&uint_word(U256::MAX));
        assert!(matches!(
            decode_selector_array(&pointing_past_end),
            Err(FacetError::MalformedReturnData(_))
        ));
    }
}
