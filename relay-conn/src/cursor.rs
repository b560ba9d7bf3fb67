//! Default cursor codec.
//!
//! A cursor is the JSON array of a node's order column values, wrapped in
//! URL-safe base64 without padding. Only values are encoded, so a cursor stays
//! valid when the physical column behind a logical name changes.

use std::cmp::Ordering;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::{ConnectionError, ConnectionResult};

pub fn encode_cursor(values: &[Value]) -> ConnectionResult<String> {
    let json = serde_json::to_vec(values).map_err(ConnectionError::accessor)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decodes a cursor and checks it carries one value per order column.
pub fn decode_cursor(cursor: &str, order_by: &[String]) -> ConnectionResult<Vec<Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| ConnectionError::InvalidCursor(format!("`{cursor}` is not valid base64")))?;
    let values: Vec<Value> = serde_json::from_slice(&bytes).map_err(|_| {
        ConnectionError::InvalidCursor(format!("`{cursor}` does not hold a value list"))
    })?;
    if values.len() != order_by.len() {
        return Err(ConnectionError::InvalidCursor(format!(
            "`{cursor}` holds {} values, ordering has {} columns",
            values.len(),
            order_by.len()
        )));
    }
    Ok(values)
}

/// Extracts the values of `columns` from a node's serialized form.
pub fn node_key<N: Serialize>(node: &N, columns: &[String]) -> ConnectionResult<Vec<Value>> {
    let value = serde_json::to_value(node).map_err(ConnectionError::accessor)?;
    let Value::Object(mut fields) = value else {
        return Err(ConnectionError::ContractViolation(
            "nodes must serialize as objects to build cursors".to_string(),
        ));
    };
    columns
        .iter()
        .map(|column| {
            fields.remove(column).ok_or_else(|| {
                ConnectionError::ContractViolation(format!("node has no `{column}` field"))
            })
        })
        .collect()
}

/// Encodes the cursor of a single node.
pub fn node_cursor<N: Serialize>(node: &N, columns: &[String]) -> ConnectionResult<String> {
    encode_cursor(&node_key(node, columns)?)
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => compare_keys(x, y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Lexicographic comparison of two composite keys.
pub fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_values(x, y))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}
