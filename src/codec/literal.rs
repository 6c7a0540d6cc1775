//! Flattening of typed property states into single string literals.
//!
//! Layout, fields joined by [`SEP`]:
//!
//! ```text
//! type %57 count %57 flags %57 modCount %57 value1 %57 value2 ...
//! ```
//!
//! `flags` is `m` for multi-valued properties and empty otherwise. Values
//! escape `%` as `%25`, so the separator never occurs inside a value;
//! binary values are hex encoded.

use std::collections::BTreeSet;

use crate::codec::SEP;
use crate::error::{AdapterError, Result};
use crate::model::{Name, NodeId, NodeReferences, PropertyId, PropertyState, PropertyType, Value};

const MULTI_FLAG: &str = "m";

fn escape_value(s: &str) -> String {
    s.replace('%', "%25")
}

fn unescape_value(s: &str) -> String {
    s.replace("%25", "%")
}

/// Some repository responses quote literals; strip that before parsing numbers
fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

fn parse_count(field: &str, literal: &str) -> Result<usize> {
    unquote(field)
        .parse()
        .map_err(|_| AdapterError::MalformedLiteral(literal.to_string()))
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::Binary(bytes) => hex::encode(bytes),
        other => escape_value(&other.as_text()),
    }
}

fn decode_value(ty: PropertyType, field: &str) -> Result<Value> {
    match ty {
        PropertyType::Binary => hex::decode(field)
            .map(Value::Binary)
            .map_err(|_| AdapterError::MalformedLiteral(format!("binary value '{}'", field))),
        _ => Value::parse(ty, &unescape_value(field)),
    }
}

/// Serialize a property state into one literal.
pub fn encode_property(state: &PropertyState) -> String {
    let mut out = format!(
        "{}{}{}{}{}{}{}",
        state.ty.code(),
        SEP,
        state.values.len(),
        SEP,
        if state.multi_valued { MULTI_FLAG } else { "" },
        SEP,
        state.mod_count
    );
    for value in &state.values {
        out.push_str(SEP);
        out.push_str(&encode_value(value));
    }
    out
}

/// Parse a literal written by [`encode_property`].
///
/// A count above one marks the property multi-valued even without the flag.
pub fn decode_property(id: PropertyId, literal: &str) -> Result<PropertyState> {
    let parts: Vec<&str> = literal.split(SEP).collect();
    if parts.len() < 4 {
        return Err(AdapterError::MalformedLiteral(literal.to_string()));
    }
    let code: u8 = unquote(parts[0])
        .parse()
        .map_err(|_| AdapterError::MalformedLiteral(literal.to_string()))?;
    let ty = PropertyType::from_code(code)
        .ok_or_else(|| AdapterError::MalformedLiteral(literal.to_string()))?;
    let count = parse_count(parts[1], literal)?;
    let mod_count = unquote(parts[3]).parse().unwrap_or(0);

    let fields = &parts[4..];
    if fields.len() != count {
        return Err(AdapterError::MalformedLiteral(literal.to_string()));
    }

    let mut state = PropertyState::new(id, ty);
    state.multi_valued = unquote(parts[2]) == MULTI_FLAG || count > 1;
    state.mod_count = mod_count;
    state.values = fields
        .iter()
        .map(|field| decode_value(ty, field))
        .collect::<Result<Vec<_>>>()?;
    Ok(state)
}

/// Decode only the first value's text, for filters and ordering.
pub fn first_value_text(literal: &str) -> Option<String> {
    literal.split(SEP).nth(4).map(unescape_value)
}

// ============================================================================
// Metadata literals
// ============================================================================

/// `count %57 name1 %57 name2 ...`
pub fn encode_mixins(mixins: &BTreeSet<Name>) -> String {
    let mut out = mixins.len().to_string();
    for name in mixins {
        out.push_str(SEP);
        out.push_str(&name.to_string());
    }
    out
}

pub fn decode_mixins(literal: &str) -> Result<BTreeSet<Name>> {
    let mut parts = literal.split(SEP);
    let count = parse_count(parts.next().unwrap_or(""), literal)?;
    let names = parts
        .map(Name::parse_expanded)
        .collect::<Result<BTreeSet<_>>>()?;
    if names.len() != count {
        return Err(AdapterError::MalformedLiteral(literal.to_string()));
    }
    Ok(names)
}

/// `count %57 propertyId1 %57 ...`
pub fn encode_references(refs: &NodeReferences) -> String {
    let mut out = refs.references.len().to_string();
    for id in &refs.references {
        out.push_str(SEP);
        out.push_str(&id.to_string());
    }
    out
}

pub fn decode_references(target: NodeId, literal: &str) -> Result<NodeReferences> {
    let mut parts = literal.split(SEP);
    let count = parse_count(parts.next().unwrap_or(""), literal)?;
    let references = parts
        .map(|p| p.parse::<PropertyId>())
        .collect::<Result<Vec<_>>>()?;
    if references.len() != count {
        return Err(AdapterError::MalformedLiteral(literal.to_string()));
    }
    Ok(NodeReferences { target, references })
}

/// Identity carried by a `jcr:uuid` literal, if it parses.
pub fn decode_uuid(literal: &str) -> Option<NodeId> {
    let raw = first_value_text(literal).unwrap_or_else(|| unquote(literal).to_string());
    raw.parse().ok()
}
