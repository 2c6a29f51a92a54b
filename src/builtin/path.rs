//! Dotted field paths over JSON values

use crate::core::PathSegment;
use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};

/// Parse `"a.b.0"` into segments. Purely numeric parts index arrays.
/// An empty string addresses the root.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(part.to_string()),
        })
        .collect()
}

pub fn lookup<'a>(value: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match (current, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get(key),
        (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
        (Value::Object(map), PathSegment::Index(i)) => map.get(&i.to_string()),
        _ => None,
    })
}

/// Mutable slot at `path`, creating missing objects along the way
pub fn slot<'a>(value: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value> {
    let mut current = value;
    for segment in path {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => {
                map.entry(key.clone()).or_insert(Value::Null)
            }
            (Value::Object(map), PathSegment::Index(i)) => {
                map.entry(i.to_string()).or_insert(Value::Null)
            }
            (Value::Array(items), PathSegment::Index(i)) => {
                let len = items.len();
                items
                    .get_mut(*i)
                    .ok_or_else(|| anyhow!("index {} out of bounds (length {})", i, len))?
            }
            (other, segment) => bail!("cannot descend into {} with '{}'", kind_of(other), segment),
        };
    }
    Ok(current)
}

/// Remove the field at `path`. Missing fields are not an error.
pub fn remove(value: &mut Value, path: &[PathSegment]) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *value = Value::Null;
        return Ok(());
    };
    let parent = match parents.iter().try_fold(&mut *value, |current, segment| {
        match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
            (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i),
            _ => None,
        }
    }) {
        Some(parent) => parent,
        None => return Ok(()),
    };

    match (parent, last) {
        (Value::Object(map), PathSegment::Key(key)) => {
            map.remove(key);
        }
        (Value::Object(map), PathSegment::Index(i)) => {
            map.remove(&i.to_string());
        }
        (Value::Array(items), PathSegment::Index(i)) if *i < items.len() => {
            items.remove(*i);
        }
        _ => {}
    }
    Ok(())
}

pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
