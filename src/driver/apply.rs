use super::{DriverError, LookupInEntry, MutateInSpec, LookupInSpec};
use crate::subdoc::{self, SubdocPath};
use serde_json::Value;

/// Evaluate lookup specs against a document. Failures are per entry.
pub(super) fn lookup_entries(document: &Value, specs: &[LookupInSpec]) -> Vec<LookupInEntry> {
    specs
        .iter()
        .map(|spec| {
            let outcome = match spec {
                LookupInSpec::Get { path } => SubdocPath::parse(path)
                    .and_then(|parsed| subdoc::lookup(document, &parsed).cloned()),
            };
            match outcome {
                Ok(value) => LookupInEntry {
                    path: spec.path().to_string(),
                    value: Some(value),
                    error: None,
                },
                Err(err) => LookupInEntry {
                    path: spec.path().to_string(),
                    value: None,
                    error: Some(err),
                },
            }
        })
        .collect()
}

/// Apply mutation specs to a copy of the document; the original is only
/// replaced by the caller once every spec has succeeded.
pub(super) fn apply_mutations(document: &Value, specs: &[MutateInSpec]) -> Result<Value, DriverError> {
    let mut updated = document.clone();
    for spec in specs {
        match spec {
            MutateInSpec::Upsert {
                path,
                value,
                create_path,
            } => {
                let parsed = SubdocPath::parse(path)?;
                subdoc::upsert(&mut updated, &parsed, value.clone(), *create_path)?;
            }
        }
    }
    Ok(updated)
}
