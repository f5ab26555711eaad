//! Named deploy-time conditions
//!
//! Conditions are declared per stack and referenced by name from `If`
//! expressions and from a resource's `Condition` attribute.

use serde_json::{json, Value};

use crate::expr::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Equals(Expr, Expr),
    Not(Box<ConditionExpr>),
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    /// Another named condition of the same stack
    Condition(String),
}

impl ConditionExpr {
    pub fn equals(a: impl Into<Expr>, b: impl Into<Expr>) -> Self {
        ConditionExpr::Equals(a.into(), b.into())
    }

    pub fn not(c: ConditionExpr) -> Self {
        ConditionExpr::Not(Box::new(c))
    }

    /// Names of other conditions this one refers to
    pub fn dependencies(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConditionExpr::Equals(..) => {}
            ConditionExpr::Not(c) => c.collect(out),
            ConditionExpr::And(cs) | ConditionExpr::Or(cs) => {
                for c in cs {
                    c.collect(out);
                }
            }
            ConditionExpr::Condition(name) => out.push(name),
        }
    }

    /// Expression operands, for resolution
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            ConditionExpr::Equals(a, b) => vec![a, b],
            ConditionExpr::Not(c) => c.operands(),
            ConditionExpr::And(cs) | ConditionExpr::Or(cs) => {
                cs.iter().flat_map(|c| c.operands()).collect()
            }
            ConditionExpr::Condition(_) => Vec::new(),
        }
    }

    /// Rewrite every operand, keeping the condition structure
    pub fn try_map<E>(&self, f: &mut impl FnMut(&Expr) -> Result<Expr, E>) -> Result<Self, E> {
        Ok(match self {
            ConditionExpr::Equals(a, b) => ConditionExpr::Equals(f(a)?, f(b)?),
            ConditionExpr::Not(c) => ConditionExpr::Not(Box::new(c.try_map(f)?)),
            ConditionExpr::And(cs) => {
                ConditionExpr::And(cs.iter().map(|c| c.try_map(f)).collect::<Result<_, _>>()?)
            }
            ConditionExpr::Or(cs) => {
                ConditionExpr::Or(cs.iter().map(|c| c.try_map(f)).collect::<Result<_, _>>()?)
            }
            ConditionExpr::Condition(name) => ConditionExpr::Condition(name.clone()),
        })
    }

    pub fn render(&self, render_expr: &impl Fn(&Expr) -> Value) -> Value {
        match self {
            ConditionExpr::Equals(a, b) => json!({ "Fn::Equals": [render_expr(a), render_expr(b)] }),
            ConditionExpr::Not(c) => json!({ "Fn::Not": [c.render(render_expr)] }),
            ConditionExpr::And(cs) => json!({
                "Fn::And": cs.iter().map(|c| c.render(render_expr)).collect::<Vec<_>>()
            }),
            ConditionExpr::Or(cs) => json!({
                "Fn::Or": cs.iter().map(|c| c.render(render_expr)).collect::<Vec<_>>()
            }),
            ConditionExpr::Condition(name) => json!({ "Condition": name }),
        }
    }
}
