use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_until},
    combinator::{map, map_res, verify},
    multi::separated_list0,
    sequence::{delimited, separated_pair},
    IResult,
};

use super::error::ParseError;
use super::types::*;

// -----------------------------------------------------------------
//
// DIGEST-MD5 ATTRIBUTE LISTS
//
// name="value",name=value,...
//
// No escaping is supported: a quoted value stops at the next quote, an
// unquoted one at the next comma. Parsing stops silently at the first
// chunk that does not look like a pair, like the servers we talk to expect.
//
// -----------------------------------------------------------------

fn attribute_name(input: &[u8]) -> IResult<&[u8], &str> {
    map_res(take_until("="), std::str::from_utf8)(input)
}

fn quoted_value(input: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(tag("\""), take_until("\""), tag("\""))(input)
}

fn bare_value(input: &[u8]) -> IResult<&[u8], &[u8]> {
    // an opening quote without its closing one is not a bare value
    verify(take_till(|c| c == b','), |v: &[u8]| !v.starts_with(b"\""))(input)
}

fn attribute(input: &[u8]) -> IResult<&[u8], Attribute> {
    map(
        separated_pair(attribute_name, tag("="), alt((quoted_value, bare_value))),
        |(name, value)| Attribute {
            name: name.to_string(),
            value: value.to_vec(),
        },
    )(input)
}

/// Every pair that can be read, in order, without any integrity check.
pub fn attribute_list(input: &[u8]) -> IResult<&[u8], AttributeList> {
    map(separated_list0(tag(","), attribute), AttributeList)(input)
}

/// Read a server challenge.
///
/// A challenge must carry exactly one `nonce` and one `algorithm`, anything
/// else is not a digest challenge and must not get near the credentials.
pub fn challenge(input: &[u8]) -> Result<AttributeList, ParseError> {
    let list = match attribute_list(input) {
        Ok((_, list)) => list,
        Err(_) => AttributeList::default(),
    };

    let (nonce, algorithm) = (list.count("nonce"), list.count("algorithm"));
    if nonce != 1 || algorithm != 1 {
        tracing::debug!(nonce, algorithm, "Rejected attribute list");
        return Err(ParseError::MalformedAttributeList { nonce, algorithm });
    }

    Ok(list)
}
