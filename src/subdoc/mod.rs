//! Sub-document paths and the field-level operations applied to JSON
//! documents by the embedded drivers.
//!
//! Paths use the dotted notation of the Couchbase sub-document API:
//! `address.city`, `items[0].sku`, `items[-1]` for the last element, and
//! backtick quoting for field names that contain dots or brackets
//! (`` `user.name`.first ``).

mod path;

pub use path::{PathSegment, SubdocPath};

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubdocError {
    #[error("Invalid path '{path}': {reason}")]
    PathInvalid { path: String, reason: String },

    #[error("Path '{0}' not found")]
    PathNotFound(String),

    #[error("Path '{0}' does not match the document structure")]
    PathMismatch(String),
}

/// Resolve a possibly negative array index against a length.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

/// Read the value addressed by `path`.
pub fn lookup<'a>(document: &'a Value, path: &SubdocPath) -> Result<&'a Value, SubdocError> {
    let mut current = document;
    for segment in path.segments() {
        current = match segment {
            PathSegment::Field(name) => current
                .as_object()
                .ok_or_else(|| SubdocError::PathMismatch(path.to_string()))?
                .get(name)
                .ok_or_else(|| SubdocError::PathNotFound(path.to_string()))?,
            PathSegment::Index(index) => {
                let items = current
                    .as_array()
                    .ok_or_else(|| SubdocError::PathMismatch(path.to_string()))?;
                let at = resolve_index(*index, items.len())
                    .ok_or_else(|| SubdocError::PathNotFound(path.to_string()))?;
                &items[at]
            }
        };
    }
    Ok(current)
}

/// Create or replace the object field addressed by `path`.
///
/// Only the final field is written; sibling and nested values are left
/// untouched. Missing parent objects are created when `create_path` is
/// set, otherwise they fail with `PathNotFound`. Arrays are never created
/// and a path ending in an array index is rejected.
pub fn upsert(
    document: &mut Value,
    path: &SubdocPath,
    value: Value,
    create_path: bool,
) -> Result<(), SubdocError> {
    let (last, parents) = path
        .segments()
        .split_last()
        .ok_or_else(|| SubdocError::PathInvalid {
            path: path.to_string(),
            reason: "path is empty".to_string(),
        })?;

    let field = match last {
        PathSegment::Field(name) => name,
        PathSegment::Index(_) => {
            return Err(SubdocError::PathInvalid {
                path: path.to_string(),
                reason: "upsert must target an object field".to_string(),
            })
        }
    };

    let mut current = document;
    for segment in parents {
        current = match segment {
            PathSegment::Field(name) => {
                let map = current
                    .as_object_mut()
                    .ok_or_else(|| SubdocError::PathMismatch(path.to_string()))?;
                if create_path {
                    map.entry(name.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(name)
                        .ok_or_else(|| SubdocError::PathNotFound(path.to_string()))?
                }
            }
            PathSegment::Index(index) => {
                let items = current
                    .as_array_mut()
                    .ok_or_else(|| SubdocError::PathMismatch(path.to_string()))?;
                let at = resolve_index(*index, items.len())
                    .ok_or_else(|| SubdocError::PathNotFound(path.to_string()))?;
                &mut items[at]
            }
        };
    }

    let map = current
        .as_object_mut()
        .ok_or_else(|| SubdocError::PathMismatch(path.to_string()))?;
    map.insert(field.clone(), value);
    Ok(())
}
