//! Structural patches recorded from drafts
//!
//! A draft is compared with its base after a middleware returns; the
//! difference is expressed as a list of [`Patch`]es over the JSON form of the
//! payload. Patches are applied in order, so array removals are emitted from
//! the highest index down.
//!
//! Drafts of different middleware all start from the same base, so a later
//! patch may address an array slot an earlier one already removed. Array
//! edits past the end are tolerated: `remove` does nothing, `add` and
//! `replace` append.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Patch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

/// One step in a patch path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => write!(f, "{}", k),
        }
    }
}

/// A recorded structural edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    /// Path rendered as a JSON pointer
    pub fn pointer(&self) -> String {
        self.path
            .iter()
            .map(|segment| format!("/{}", segment))
            .collect()
    }
}

/// A patch whose path does not resolve against the target
#[derive(Debug, Error)]
#[error("cannot apply {op:?} patch at \"{pointer}\": {reason}")]
pub struct PatchError {
    pub op: PatchOp,
    pub pointer: String,
    pub reason: &'static str,
}

/// Compute the patches that turn `base` into `draft`
pub fn diff(base: &Value, draft: &Value) -> Vec<Patch> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    diff_into(base, draft, &mut path, &mut out);
    out
}

fn diff_into(base: &Value, draft: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<Patch>) {
    if base == draft {
        return;
    }

    match (base, draft) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                path.push(PathSegment::Key(key.clone()));
                match new.get(key) {
                    Some(new_value) => diff_into(old_value, new_value, path, out),
                    None => out.push(Patch {
                        op: PatchOp::Remove,
                        path: path.clone(),
                        value: None,
                    }),
                }
                path.pop();
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    path.push(PathSegment::Key(key.clone()));
                    out.push(Patch {
                        op: PatchOp::Add,
                        path: path.clone(),
                        value: Some(new_value.clone()),
                    });
                    path.pop();
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            let common = old.len().min(new.len());
            for i in 0..common {
                path.push(PathSegment::Index(i));
                diff_into(&old[i], &new[i], path, out);
                path.pop();
            }
            for (i, item) in new.iter().enumerate().skip(common) {
                path.push(PathSegment::Index(i));
                out.push(Patch {
                    op: PatchOp::Add,
                    path: path.clone(),
                    value: Some(item.clone()),
                });
                path.pop();
            }
            for i in (common..old.len()).rev() {
                path.push(PathSegment::Index(i));
                out.push(Patch {
                    op: PatchOp::Remove,
                    path: path.clone(),
                    value: None,
                });
                path.pop();
            }
        }
        _ => out.push(Patch {
            op: PatchOp::Replace,
            path: path.clone(),
            value: Some(draft.clone()),
        }),
    }
}

/// Apply patches to `target` in order
pub fn apply(target: &mut Value, patches: &[Patch]) -> Result<(), PatchError> {
    for patch in patches {
        apply_one(target, patch)?;
    }
    Ok(())
}

/// Apply every patch that resolves against `target`, in order. Patches whose
/// parent path no longer exists are skipped and returned.
pub fn apply_resolvable(target: &mut Value, patches: &[Patch]) -> Vec<PatchError> {
    patches
        .iter()
        .filter_map(|patch| apply_one(target, patch).err())
        .collect()
}

fn apply_one(target: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    let fail = |reason| PatchError {
        op: patch.op,
        pointer: patch.pointer(),
        reason,
    };

    let Some((last, parents)) = patch.path.split_last() else {
        *target = match patch.op {
            PatchOp::Remove => Value::Null,
            _ => patch.value.clone().unwrap_or(Value::Null),
        };
        return Ok(());
    };

    let mut parent = target;
    for segment in parents {
        parent = match (parent, segment) {
            (Value::Object(map), PathSegment::Key(key)) => {
                map.get_mut(key).ok_or_else(|| fail("missing key"))?
            }
            (Value::Array(items), PathSegment::Index(i)) => {
                items.get_mut(*i).ok_or_else(|| fail("index out of bounds"))?
            }
            _ => return Err(fail("path does not resolve")),
        };
    }

    let value = || patch.value.clone().unwrap_or(Value::Null);
    match (parent, last) {
        (Value::Object(map), PathSegment::Key(key)) => match patch.op {
            PatchOp::Add | PatchOp::Replace => {
                map.insert(key.clone(), value());
            }
            PatchOp::Remove => {
                map.remove(key);
            }
        },
        (Value::Array(items), PathSegment::Index(i)) => match patch.op {
            PatchOp::Add | PatchOp::Replace if *i >= items.len() => items.push(value()),
            PatchOp::Add => items.insert(*i, value()),
            PatchOp::Replace => items[*i] = value(),
            PatchOp::Remove if *i < items.len() => {
                items.remove(*i);
            }
            PatchOp::Remove => {}
        },
        _ => return Err(fail("path does not resolve")),
    }
    Ok(())
}
