//! Resource records and handles
//!
//! A `ResourceRecord` is the plain data a stack keeps per resource. Callers
//! outside the stack only ever see a `ResourceHandle`, which can produce
//! `Ref`/`GetAtt` expressions pointing at the record.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{SynthError, SynthResult};
use crate::expr::{Expr, LogicalRef};
use crate::lifecycle::Lifecycle;

/// One resource of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub logical_id: String,
    pub resource_type: String,
    /// Construct path the logical id was derived from
    pub path: String,
    pub properties: BTreeMap<String, Expr>,
    pub lifecycle: Option<Lifecycle>,
    /// Explicit dependencies only; implicit ones come from references
    pub depends_on: BTreeSet<String>,
    pub condition: Option<String>,
}

impl ResourceRecord {
    pub fn new(
        logical_id: impl Into<String>,
        resource_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            path: path.into(),
            properties: BTreeMap::new(),
            lifecycle: None,
            depends_on: BTreeSet::new(),
            condition: None,
        }
    }

    /// Every expression attached to this record
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.properties.values()
    }
}

/// Record an explicit dependency of `record` on `logical_id`.
///
/// A resource can never depend on itself. Cycles through other resources
/// are detected by the owning stack's dependency graph.
pub fn with_dependency(record: &mut ResourceRecord, logical_id: &str) -> SynthResult<()> {
    if record.logical_id == logical_id {
        return Err(SynthError::cycle(vec![
            record.logical_id.clone(),
            record.logical_id.clone(),
        ]));
    }
    record.depends_on.insert(logical_id.to_string());
    Ok(())
}

/// Read-only address of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub stack: String,
    pub logical_id: String,
    pub resource_type: String,
}

impl ResourceHandle {
    pub fn target(&self) -> LogicalRef {
        LogicalRef::new(&self.stack, &self.logical_id)
    }

    /// `{"Ref": <logical id>}`
    pub fn reference(&self) -> Expr {
        Expr::reference(self.target())
    }

    /// `{"Fn::GetAtt": [<logical id>, name]}`
    pub fn attribute(&self, name: &str) -> Expr {
        Expr::get_att(self.target(), name)
    }
}
