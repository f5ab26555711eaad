//! Expression tree for deferred values
//!
//! A closed set of node kinds describes every value that may end up in a
//! template:
//! - **Literal**: concrete JSON values known at construction time
//! - **Pseudo**: environment-level values (partition, region, account, ...)
//! - **Ref / GetAtt**: another resource's logical id or output attribute
//! - **Join / Split / Select**: string and sequence operations
//! - **List / Map**: structural containers
//! - **If**: deploy-time branch on a named condition
//! - **Token**: a placeholder whose recipe is held by the stack's token table
//! - **ImportValue**: produced by the resolver for cross-stack references
//!
//! Trees are plain immutable values. Nothing is resolved while building;
//! see [`crate::resolve`] for the folding pass.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::token::TokenId;

// =============================================================================
// TARGETS
// =============================================================================

/// Environment-level values that are only known at deploy time unless the
/// stack pins them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pseudo {
    Partition,
    Region,
    AccountId,
    StackName,
    UrlSuffix,
}

impl Pseudo {
    /// Name used in the emitted `Ref`
    pub fn as_str(&self) -> &'static str {
        match self {
            Pseudo::Partition => "AWS::Partition",
            Pseudo::Region => "AWS::Region",
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::StackName => "AWS::StackName",
            Pseudo::UrlSuffix => "AWS::URLSuffix",
        }
    }
}

impl fmt::Display for Pseudo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pseudo {
    type Err = SynthError;

    /// Accepts both `Region` and `AWS::Region`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("AWS::").unwrap_or(s) {
            "Partition" => Ok(Pseudo::Partition),
            "Region" => Ok(Pseudo::Region),
            "AccountId" | "Account" => Ok(Pseudo::AccountId),
            "StackName" => Ok(Pseudo::StackName),
            "URLSuffix" | "UrlSuffix" => Ok(Pseudo::UrlSuffix),
            _ => Err(ValidationError::new(
                Rule::UnknownTarget,
                s,
                format!("unknown pseudo parameter '{}'", s),
            )
            .into()),
        }
    }
}

/// Address of a resource: owning stack plus logical id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalRef {
    pub stack: String,
    pub logical_id: String,
}

impl LogicalRef {
    pub fn new(stack: impl Into<String>, logical_id: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            logical_id: logical_id.into(),
        }
    }
}

impl fmt::Display for LogicalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stack, self.logical_id)
    }
}

// =============================================================================
// EXPRESSION
// =============================================================================

/// A possibly-deferred value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Pseudo(Pseudo),
    Ref(LogicalRef),
    GetAtt {
        target: LogicalRef,
        attribute: String,
    },
    Join {
        delimiter: Box<Expr>,
        parts: Vec<Expr>,
    },
    Split {
        delimiter: Box<Expr>,
        source: Box<Expr>,
    },
    Select {
        index: usize,
        source: Box<Expr>,
    },
    List(Vec<Expr>),
    If {
        condition: String,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Map(BTreeMap<String, Expr>),
    Token(TokenId),
    ImportValue(String),
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Value::String(s.into()))
    }

    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    pub fn pseudo(p: Pseudo) -> Self {
        Expr::Pseudo(p)
    }

    pub fn reference(target: LogicalRef) -> Self {
        Expr::Ref(target)
    }

    pub fn get_att(target: LogicalRef, attribute: impl Into<String>) -> Self {
        Expr::GetAtt {
            target,
            attribute: attribute.into(),
        }
    }

    pub fn join(delimiter: impl Into<Expr>, parts: Vec<Expr>) -> Self {
        Expr::Join {
            delimiter: Box::new(delimiter.into()),
            parts,
        }
    }

    /// `Join("", parts)`
    pub fn concat(parts: Vec<Expr>) -> Self {
        Self::join("", parts)
    }

    pub fn split(delimiter: impl Into<Expr>, source: Expr) -> Self {
        Expr::Split {
            delimiter: Box::new(delimiter.into()),
            source: Box::new(source),
        }
    }

    pub fn select(index: usize, source: Expr) -> Self {
        Expr::Select {
            index,
            source: Box::new(source),
        }
    }

    pub fn list(items: Vec<Expr>) -> Self {
        Expr::List(items)
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Expr)>,
    {
        Expr::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn conditional(condition: impl Into<String>, if_true: Expr, if_false: Expr) -> Self {
        Expr::If {
            condition: condition.into(),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn token(id: TokenId) -> Self {
        Expr::Token(id)
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Literal string content, if this is a string literal
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Short node kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Literal(v) => literal_kind(v),
            Expr::Pseudo(_) => "pseudo reference",
            Expr::Ref(_) => "Ref",
            Expr::GetAtt { .. } => "Fn::GetAtt",
            Expr::Join { .. } => "Fn::Join",
            Expr::Split { .. } => "Fn::Split",
            Expr::Select { .. } => "Fn::Select",
            Expr::List(_) => "list",
            Expr::If { .. } => "Fn::If",
            Expr::Map(_) => "map",
            Expr::Token(_) => "placeholder",
            Expr::ImportValue(_) => "Fn::ImportValue",
        }
    }

    /// Kind plus the value itself for literals, e.g. `number 42`
    pub fn describe(&self) -> String {
        match self {
            Expr::Literal(v) => format!("{} {}", literal_kind(v), v),
            other => other.kind().to_string(),
        }
    }

    /// Whether this node evaluates to a sequence rather than a scalar
    pub fn is_sequence_valued(&self) -> bool {
        matches!(
            self,
            Expr::Split { .. } | Expr::List(_) | Expr::Literal(Value::Array(_))
        )
    }

    /// Whether this node evaluates to a structured document
    pub fn is_document_valued(&self) -> bool {
        matches!(self, Expr::Map(_) | Expr::Literal(Value::Object(_)))
    }

    /// Explicit conversion to a string-valued expression.
    ///
    /// Numbers and booleans become their decimal/`true`/`false` text.
    /// String-valued intrinsics pass through. Null, sequences and documents
    /// have no string form.
    pub fn stringify(self) -> SynthResult<Expr> {
        match self {
            Expr::Literal(Value::String(_)) => Ok(self),
            Expr::Literal(Value::Number(n)) => Ok(Expr::string(n.to_string())),
            Expr::Literal(Value::Bool(b)) => Ok(Expr::string(b.to_string())),
            ref e if e.is_sequence_valued() || e.is_document_valued() => {
                Err(SynthError::type_mismatch("stringify", "scalar", e.describe()))
            }
            Expr::Literal(Value::Null) => {
                Err(SynthError::type_mismatch("stringify", "scalar", "null"))
            }
            other => Ok(other),
        }
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// Pre-order walk over this node and all descendants
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Join { delimiter, parts } => {
                delimiter.walk(visit);
                for p in parts {
                    p.walk(visit);
                }
            }
            Expr::Split { delimiter, source } => {
                delimiter.walk(visit);
                source.walk(visit);
            }
            Expr::Select { source, .. } => source.walk(visit),
            Expr::List(items) => {
                for i in items {
                    i.walk(visit);
                }
            }
            Expr::If {
                if_true, if_false, ..
            } => {
                if_true.walk(visit);
                if_false.walk(visit);
            }
            Expr::Map(entries) => {
                for v in entries.values() {
                    v.walk(visit);
                }
            }
            Expr::Literal(_)
            | Expr::Pseudo(_)
            | Expr::Ref(_)
            | Expr::GetAtt { .. }
            | Expr::Token(_)
            | Expr::ImportValue(_) => {}
        }
    }

    /// Placeholders referenced directly by this tree (not through recipes)
    pub fn tokens(&self) -> Vec<TokenId> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Token(id) = e {
                out.push(*id);
            }
        });
        out
    }

    /// Resources referenced directly by this tree via Ref or GetAtt
    pub fn references(&self) -> Vec<&LogicalRef> {
        let mut out = Vec::new();
        self.walk(&mut |e| match e {
            Expr::Ref(target) | Expr::GetAtt { target, .. } => out.push(target),
            _ => {}
        });
        out
    }

    /// Condition names used by `If` nodes in this tree
    pub fn conditions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::If { condition, .. } = e {
                out.push(condition.as_str());
            }
        });
        out
    }
}

fn literal_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::string(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::string(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::from(n))
    }
}

impl From<u32> for Expr {
    fn from(n: u32) -> Self {
        Expr::Literal(Value::from(n))
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<Pseudo> for Expr {
    fn from(p: Pseudo) -> Self {
        Expr::Pseudo(p)
    }
}
