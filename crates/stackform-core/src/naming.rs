//! Logical-id allocation and export naming
//!
//! ## Logical id policy
//! - Single-component paths are used as-is (alphanumerics only).
//! - Otherwise: human part (path components minus `Resource`/`Default`,
//!   consecutive duplicates collapsed) + first 4 bytes of SHA-256 over the
//!   `/`-joined path, upper-case hex.
//! - Deterministic across re-runs; unique per document.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::{Rule, SynthResult, ValidationError};
use crate::expr::LogicalRef;

/// Path component hidden from the human part and from the hash
const HIDDEN_ID: &str = "Default";

/// Path component hidden from the human part only
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";

/// Max length of the human-readable part of a logical id
const MAX_HUMAN_LEN: usize = 240;

/// Strip everything but ASCII alphanumerics
pub fn sanitize(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// First 4 bytes (8 hex chars) of SHA-256, upper-case
pub fn short_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode_upper(&hasher.finalize()[..4])
}

/// Compute the unique id of a construct path.
///
/// Used both for logical ids and for default physical names.
pub fn unique_id(path: &[&str]) -> SynthResult<String> {
    let components: Vec<&str> = path
        .iter()
        .copied()
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if components.is_empty() {
        return Err(empty_path(path));
    }

    if components.len() == 1 {
        let id = sanitize(components[0]);
        if id.is_empty() {
            return Err(empty_path(path));
        }
        return Ok(id);
    }

    let hash = short_hash(&components.join("/"));

    let mut human: Vec<&str> = Vec::new();
    for c in components.iter().filter(|c| **c != HIDDEN_FROM_HUMAN_ID) {
        if human.last() != Some(c) {
            human.push(*c);
        }
    }
    let mut human: String = human.iter().map(|c| sanitize(c)).collect();
    human.truncate(MAX_HUMAN_LEN);

    Ok(format!("{}{}", human, hash))
}

fn empty_path(path: &[&str]) -> crate::error::SynthError {
    ValidationError::new(
        Rule::Empty,
        path.join("/"),
        format!(
            "construct path '{}' has no alphanumeric component to derive an id from",
            path.join("/")
        ),
    )
    .into()
}

/// Export name for a cross-stack reference to `target`
pub fn export_name(producer: &str, target: &LogicalRef, attribute: Option<&str>) -> String {
    let kind = if attribute.is_some() { "FnGetAtt" } else { "Ref" };
    let attr = attribute.unwrap_or("");
    let body = sanitize(&format!("{}{}", target.logical_id, attr));
    let hash = short_hash(&format!("{}/{}/{}", target.stack, target.logical_id, attr));
    format!("{}:ExportsOutput{}{}{}", producer, kind, body, hash)
}

/// Output logical id for an export name (the part after the stack prefix)
pub fn export_output_id(export_name: &str) -> String {
    let local = export_name
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(export_name);
    sanitize(local)
}

/// Hands out logical ids within one document, rejecting duplicates.
#[derive(Debug, Clone, Default)]
pub struct LogicalIdAllocator {
    used: BTreeMap<String, String>,
}

impl LogicalIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, path: &[&str]) -> SynthResult<String> {
        let id = unique_id(path)?;
        let joined = path.join("/");
        if let Some(existing) = self.used.get(&id) {
            return Err(ValidationError::new(
                Rule::DuplicateId,
                joined.clone(),
                format!(
                    "logical id '{}' for path '{}' is already used by '{}'",
                    id, joined, existing
                ),
            )
            .into());
        }
        self.used.insert(id.clone(), joined);
        Ok(id)
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.used.contains_key(logical_id)
    }
}
