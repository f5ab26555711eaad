//! Resolver: fold an expression tree against what is known at synthesis
//!
//! ## Pass
//!
//! ```text
//! Expr tree (placeholders, refs, joins, ...)
//!        ↓  children first, Join parts left-to-right
//!  substitute: placeholders → recipes, pinned pseudo params → literals,
//!              known refs/attributes → literals, foreign refs → ImportValue
//!        ↓
//!  fold (optional): all-literal Join/Split/Select/List/Map/If → Literal
//!        ↓
//! Expr tree (Literal when fully known, structural otherwise)
//! ```
//!
//! Folding never changes meaning: resolving with `fold = false` and then
//! again with `fold = true` gives the same tree as folding directly.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{trace, warn};

use crate::env::StackEnv;
use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::expr::{Expr, LogicalRef};
use crate::naming::export_name;
use crate::token::{TokenId, TokenTable};

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Values the caller has declared known ahead of deploy time.
#[derive(Debug, Clone, Default)]
pub struct KnownValues {
    refs: BTreeMap<LogicalRef, Value>,
    attributes: BTreeMap<(LogicalRef, String), Value>,
    conditions: BTreeMap<String, bool>,
}

impl KnownValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ref(&mut self, target: LogicalRef, value: impl Into<Value>) {
        self.refs.insert(target, value.into());
    }

    pub fn set_attribute(
        &mut self,
        target: LogicalRef,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.attributes
            .insert((target, attribute.into()), value.into());
    }

    pub fn set_condition(&mut self, name: impl Into<String>, value: bool) {
        self.conditions.insert(name.into(), value);
    }

    pub fn reference(&self, target: &LogicalRef) -> Option<&Value> {
        self.refs.get(target)
    }

    pub fn attribute(&self, target: &LogicalRef, attribute: &str) -> Option<&Value> {
        self.attributes
            .get(&(target.clone(), attribute.to_string()))
    }

    pub fn condition(&self, name: &str) -> Option<bool> {
        self.conditions.get(name).copied()
    }
}

/// Everything the resolver may consult.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    /// Name of the document being synthesized
    pub stack: &'a str,
    pub stack_env: &'a StackEnv,
    pub known: &'a KnownValues,
    pub tokens: &'a TokenTable,
    pub fold: bool,
}

/// A reference that crosses documents, to be satisfied by an export.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CrossReference {
    pub consumer: String,
    pub target: LogicalRef,
    pub attribute: Option<String>,
    pub export_name: String,
}

/// Outcome of resolving one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Literal(Value),
    Deferred(Expr),
}

impl From<Expr> for Resolved {
    fn from(e: Expr) -> Self {
        match e {
            Expr::Literal(v) => Resolved::Literal(v),
            other => Resolved::Deferred(other),
        }
    }
}

impl Resolved {
    pub fn is_literal(&self) -> bool {
        matches!(self, Resolved::Literal(_))
    }

    pub fn into_expr(self) -> Expr {
        match self {
            Resolved::Literal(v) => Expr::Literal(v),
            Resolved::Deferred(e) => e,
        }
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Resolve a tree in isolation, discarding any cross-stack bookkeeping
pub fn resolve(expr: &Expr, env: Environment<'_>) -> SynthResult<Expr> {
    Resolver::new(env).resolve(expr)
}

pub struct Resolver<'a> {
    env: Environment<'a>,
    imports: Vec<CrossReference>,
    visiting: Vec<TokenId>,
}

impl<'a> Resolver<'a> {
    pub fn new(env: Environment<'a>) -> Self {
        Self {
            env,
            imports: Vec::new(),
            visiting: Vec::new(),
        }
    }

    /// Cross-stack references met so far, in encounter order
    pub fn imports(&self) -> &[CrossReference] {
        &self.imports
    }

    pub fn into_imports(self) -> Vec<CrossReference> {
        self.imports
    }

    pub fn resolve_value(&mut self, expr: &Expr) -> SynthResult<Resolved> {
        self.resolve(expr).map(Resolved::from)
    }

    pub fn resolve(&mut self, expr: &Expr) -> SynthResult<Expr> {
        match expr {
            Expr::Literal(_) | Expr::ImportValue(_) => Ok(expr.clone()),

            Expr::Pseudo(p) => Ok(self
                .env
                .stack_env
                .pseudo_value(*p, self.env.stack)
                .map(Expr::string)
                .unwrap_or_else(|| expr.clone())),

            Expr::Ref(target) => Ok(self.resolve_target(target, None, expr)),

            Expr::GetAtt { target, attribute } => {
                Ok(self.resolve_target(target, Some(attribute), expr))
            }

            Expr::Join { delimiter, parts } => self.resolve_join(delimiter, parts),

            Expr::Split { delimiter, source } => self.resolve_split(delimiter, source),

            Expr::Select { index, source } => self.resolve_select(*index, source),

            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|i| self.resolve(i))
                    .collect::<SynthResult<Vec<_>>>()?;
                if self.env.fold && items.iter().all(Expr::is_literal) {
                    return Ok(Expr::Literal(Value::Array(
                        items.into_iter().map(into_literal).collect(),
                    )));
                }
                Ok(Expr::List(items))
            }

            Expr::Map(entries) => {
                let mut resolved = BTreeMap::new();
                for (k, v) in entries {
                    resolved.insert(k.clone(), self.resolve(v)?);
                }
                if self.env.fold && resolved.values().all(Expr::is_literal) {
                    let object: Map<String, Value> = resolved
                        .into_iter()
                        .map(|(k, v)| (k, into_literal(v)))
                        .collect();
                    return Ok(Expr::Literal(Value::Object(object)));
                }
                Ok(Expr::Map(resolved))
            }

            Expr::If {
                condition,
                if_true,
                if_false,
            } => {
                let if_true = self.resolve(if_true)?;
                let if_false = self.resolve(if_false)?;
                if self.env.fold {
                    if let Some(value) = self.env.known.condition(condition) {
                        return Ok(if value { if_true } else { if_false });
                    }
                }
                Ok(Expr::If {
                    condition: condition.clone(),
                    if_true: Box::new(if_true),
                    if_false: Box::new(if_false),
                })
            }

            Expr::Token(id) => self.resolve_token(*id),
        }
    }

    fn resolve_target(
        &mut self,
        target: &LogicalRef,
        attribute: Option<&String>,
        original: &Expr,
    ) -> Expr {
        let known = match attribute {
            Some(attr) => self.env.known.attribute(target, attr),
            None => self.env.known.reference(target),
        };
        if let Some(v) = known {
            return Expr::Literal(v.clone());
        }

        if target.stack != self.env.stack {
            let name = export_name(&target.stack, target, attribute.map(String::as_str));
            let xref = CrossReference {
                consumer: self.env.stack.to_string(),
                target: target.clone(),
                attribute: attribute.cloned(),
                export_name: name.clone(),
            };
            if !self.imports.contains(&xref) {
                trace!(export = %name, "cross-stack reference");
                self.imports.push(xref);
            }
            return Expr::ImportValue(name);
        }

        original.clone()
    }

    fn resolve_join(&mut self, delimiter: &Expr, parts: &[Expr]) -> SynthResult<Expr> {
        let delimiter = self.resolve(delimiter)?;
        check_scalar_string("Fn::Join", &delimiter)?;

        let mut resolved = Vec::with_capacity(parts.len());
        for part in parts {
            let part = self.resolve(part)?;
            check_scalar_string("Fn::Join", &part)?;
            resolved.push(part);
        }

        if self.env.fold {
            if let Some(d) = delimiter.as_str() {
                let strings: Option<Vec<&str>> = resolved.iter().map(Expr::as_str).collect();
                if let Some(strings) = strings {
                    return Ok(Expr::string(strings.join(d)));
                }
            }
        }

        Ok(Expr::Join {
            delimiter: Box::new(delimiter),
            parts: resolved,
        })
    }

    fn resolve_split(&mut self, delimiter: &Expr, source: &Expr) -> SynthResult<Expr> {
        let delimiter = self.resolve(delimiter)?;
        check_scalar_string("Fn::Split", &delimiter)?;
        let source = self.resolve(source)?;
        check_scalar_string("Fn::Split", &source)?;

        if self.env.fold {
            if let (Some(d), Some(s)) = (delimiter.as_str(), source.as_str()) {
                if !d.is_empty() {
                    return Ok(Expr::Literal(Value::Array(
                        s.split(d).map(|p| Value::String(p.to_string())).collect(),
                    )));
                }
            }
        }

        Ok(Expr::Split {
            delimiter: Box::new(delimiter),
            source: Box::new(source),
        })
    }

    fn resolve_select(&mut self, index: usize, source: &Expr) -> SynthResult<Expr> {
        let source = self.resolve(source)?;

        match &source {
            Expr::Literal(Value::Array(items)) => {
                if let Some(item) = items.get(index) {
                    if self.env.fold {
                        return Ok(Expr::Literal(item.clone()));
                    }
                } else {
                    warn!(
                        index,
                        len = items.len(),
                        "Fn::Select index out of bounds, left for deploy time"
                    );
                }
            }
            Expr::List(items) => {
                if let Some(item) = items.get(index) {
                    if self.env.fold {
                        return Ok(item.clone());
                    }
                }
            }
            other if other.is_literal() || other.is_document_valued() => {
                return Err(SynthError::type_mismatch(
                    "Fn::Select",
                    "sequence",
                    other.describe(),
                ));
            }
            _ => {}
        }

        Ok(Expr::Select {
            index,
            source: Box::new(source),
        })
    }

    fn resolve_token(&mut self, id: TokenId) -> SynthResult<Expr> {
        if let Some(pos) = self.visiting.iter().position(|t| *t == id) {
            let mut path: Vec<String> = self.visiting[pos..]
                .iter()
                .map(|t| self.token_name(*t))
                .collect();
            path.push(self.token_name(id));
            return Err(SynthError::cycle(path));
        }

        let recipe = self.env.tokens.recipe(id)?;
        self.visiting.push(id);
        let result = self.resolve(recipe);
        self.visiting.pop();
        result
    }

    fn token_name(&self, id: TokenId) -> String {
        self.env
            .tokens
            .get(id)
            .map(|p| p.display_name())
            .unwrap_or_else(|_| id.to_string())
    }
}

fn into_literal(e: Expr) -> Value {
    match e {
        Expr::Literal(v) => v,
        _ => Value::Null,
    }
}

/// A string operand must not be a non-string literal, a sequence or a document
fn check_scalar_string(operation: &'static str, operand: &Expr) -> SynthResult<()> {
    match operand {
        Expr::Literal(Value::String(_)) => Ok(()),
        Expr::Literal(_) => Err(SynthError::type_mismatch(
            operation,
            "string",
            operand.describe(),
        )),
        e if e.is_sequence_valued() || e.is_document_valued() => Err(SynthError::type_mismatch(
            operation,
            "string",
            e.describe(),
        )),
        _ => Ok(()),
    }
}

/// Static operand check without placeholder expansion.
///
/// Catches literal type errors at the construction call that introduces
/// them; placeholders are checked again once their recipes are known.
pub fn typecheck(expr: &Expr) -> SynthResult<()> {
    let mut result = Ok(());
    expr.walk(&mut |e| {
        if result.is_err() {
            return;
        }
        result = match e {
            Expr::Join { delimiter, parts } => check_scalar_string("Fn::Join", delimiter)
                .and_then(|_| {
                    parts
                        .iter()
                        .try_for_each(|p| check_scalar_string("Fn::Join", p))
                }),
            Expr::Split { delimiter, source } => check_scalar_string("Fn::Split", delimiter)
                .and_then(|_| check_scalar_string("Fn::Split", source)),
            Expr::Select { source, .. } => match source.as_ref() {
                Expr::Literal(Value::Array(_)) => Ok(()),
                s if s.is_literal() || s.is_document_valued() => Err(SynthError::type_mismatch(
                    "Fn::Select",
                    "sequence",
                    s.describe(),
                )),
                _ => Ok(()),
            },
            _ => Ok(()),
        };
    });
    result
}

// =============================================================================
// RENDERING
// =============================================================================

/// Serialize a (resolved) tree using the template intrinsic vocabulary
pub fn render(expr: &Expr) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Pseudo(p) => json!({ "Ref": p.as_str() }),
        Expr::Ref(target) => json!({ "Ref": target.logical_id }),
        Expr::GetAtt { target, attribute } => {
            json!({ "Fn::GetAtt": [target.logical_id, attribute] })
        }
        Expr::Join { delimiter, parts } => json!({
            "Fn::Join": [render(delimiter), parts.iter().map(render).collect::<Vec<_>>()]
        }),
        Expr::Split { delimiter, source } => {
            json!({ "Fn::Split": [render(delimiter), render(source)] })
        }
        Expr::Select { index, source } => json!({ "Fn::Select": [index, render(source)] }),
        Expr::List(items) => Value::Array(items.iter().map(render).collect()),
        Expr::If {
            condition,
            if_true,
            if_false,
        } => json!({ "Fn::If": [condition, render(if_true), render(if_false)] }),
        Expr::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), render(v)))
                .collect(),
        ),
        Expr::Token(id) => Value::String(id.to_string()),
        Expr::ImportValue(name) => json!({ "Fn::ImportValue": name }),
    }
}

/// Unknown condition names used by a tree
pub fn undefined_conditions(
    expr: &Expr,
    defined: &impl Fn(&str) -> bool,
) -> Option<ValidationError> {
    expr.conditions()
        .into_iter()
        .find(|c| !defined(*c))
        .map(|c| {
            ValidationError::new(
                Rule::UnknownCondition,
                c,
                format!("condition '{}' is not defined in this stack", c),
            )
        })
}
