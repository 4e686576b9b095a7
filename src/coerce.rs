//! Type-directed conversion of user text into remote attribute values.
//!
//! The current value of an attribute is used as a template: the text typed on
//! the command line is parsed into a value of the same shape. Composite values
//! are written with `,` between items and `:` between a mapping key and its
//! value, e.g. `4,5,6` or `x:1.5,y:2`.
//!
//! # Example
//!
//! ```
//! use daq_cli::coerce::coerce;
//! use daq_cli::value::Value;
//!
//! let sample = Value::list([Value::Int(1), Value::Int(2)]);
//! let parsed = coerce(&sample, "4,5,6").unwrap();
//! assert_eq!(parsed, Value::list([Value::Int(4), Value::Int(5), Value::Int(6)]));
//! ```

use tracing::warn;

use crate::error::{CliError, CliResult};
use crate::value::Value;

const ITEM_SEPARATOR: char = ',';
const KEY_SEPARATOR: char = ':';

/// Convert `text` into a value shaped like `sample`.
///
/// `sample` only provides the type; its contents are never used as defaults.
pub fn coerce(sample: &Value, text: &str) -> CliResult<Value> {
    match sample {
        Value::Bool(_) => coerce_bool(text),
        Value::Int(_) => coerce_int(text),
        Value::Float(_) => coerce_float(text),
        Value::String(_) => Ok(Value::String(text.to_string())),
        Value::Mapping(entries) => coerce_mapping(entries, text),
        Value::Sequence(kind, items) => {
            let item_sample = match items.first() {
                Some(first) => first.clone(),
                None => unknown_item_type(),
            };
            let parsed = text
                .split(ITEM_SEPARATOR)
                .map(|item| coerce(&item_sample, item))
                .collect::<CliResult<Vec<_>>>()?;
            Ok(Value::Sequence(*kind, parsed))
        }
        Value::Opaque { type_name } => Err(CliError::UnsupportedType {
            type_name: type_name.clone(),
            text: text.to_string(),
        }),
    }
}

fn coerce_bool(text: &str) -> CliResult<Value> {
    if text.eq_ignore_ascii_case("true") {
        Ok(Value::Bool(true))
    } else if text.eq_ignore_ascii_case("false") {
        Ok(Value::Bool(false))
    } else {
        Err(conversion_error(text, "bool"))
    }
}

fn coerce_int(text: &str) -> CliResult<Value> {
    text.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| conversion_error(text, "int"))
}

fn coerce_float(text: &str) -> CliResult<Value> {
    text.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| conversion_error(text, "float"))
}

fn coerce_mapping(entries: &[(Value, Value)], text: &str) -> CliResult<Value> {
    let (key_sample, value_sample) = match entries.first() {
        Some((k, v)) => (k.clone(), v.clone()),
        None => {
            let sample = unknown_item_type();
            (sample.clone(), sample)
        }
    };

    let mut pairs = Vec::new();
    for item in text.split(ITEM_SEPARATOR) {
        let (key, value) = item
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| conversion_error(item, "key:value pair"))?;
        pairs.push((coerce(&key_sample, key)?, coerce(&value_sample, value)?));
    }
    Ok(Value::mapping(pairs))
}

fn unknown_item_type() -> Value {
    warn!("Type of attribute is unknown, using string");
    Value::String(String::new())
}

fn conversion_error(text: &str, target: &str) -> CliError {
    CliError::Conversion {
        text: text.to_string(),
        target: target.to_string(),
    }
}
