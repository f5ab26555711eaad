//! Placeholder table
//!
//! A placeholder is declared first (identity + display hint) and bound to a
//! recipe later. Binding checks the recipe graph so that a placeholder can
//! never reach itself through recipes; the cycle is reported at the bind
//! call that would introduce it.

use std::collections::HashSet;
use std::fmt;

use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::expr::Expr;

/// Opaque placeholder identity, stable for the lifetime of its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{Token[{}]}}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Placeholder {
    pub id: TokenId,
    pub hint: Option<String>,
    pub recipe: Option<Expr>,
}

impl Placeholder {
    /// Hint for error messages, falling back to the token display form
    pub fn display_name(&self) -> String {
        match &self.hint {
            Some(h) => format!("{} ({})", h, self.id),
            None => self.id.to_string(),
        }
    }
}

/// All placeholders of one document.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    entries: Vec<Placeholder>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a placeholder whose recipe will be bound later
    pub fn declare(&mut self, hint: Option<&str>) -> TokenId {
        let id = TokenId(self.entries.len() as u32);
        self.entries.push(Placeholder {
            id,
            hint: hint.map(str::to_string),
            recipe: None,
        });
        id
    }

    /// Declare and bind in one step
    pub fn define(&mut self, hint: Option<&str>, recipe: Expr) -> SynthResult<TokenId> {
        let id = self.declare(hint);
        self.bind(id, recipe)?;
        Ok(id)
    }

    /// Bind the recipe of a declared placeholder.
    ///
    /// Fails if the placeholder is unknown, already bound, or if the recipe
    /// reaches the placeholder itself through other recipes.
    pub fn bind(&mut self, id: TokenId, recipe: Expr) -> SynthResult<()> {
        let entry = self.get(id)?;
        if entry.recipe.is_some() {
            return Err(ValidationError::new(
                Rule::AlreadyBound,
                entry.display_name(),
                format!("placeholder {} is already bound", entry.display_name()),
            )
            .into());
        }

        if let Some(path) = self.path_to(&recipe, id) {
            let mut names = vec![self.name_of(id)];
            names.extend(path.into_iter().map(|t| self.name_of(t)));
            return Err(SynthError::cycle(names));
        }

        self.entries[id.0 as usize].recipe = Some(recipe);
        Ok(())
    }

    pub fn get(&self, id: TokenId) -> SynthResult<&Placeholder> {
        self.entries.get(id.0 as usize).ok_or_else(|| {
            ValidationError::new(
                Rule::UnknownTarget,
                id.to_string(),
                format!("placeholder {} does not belong to this document", id),
            )
            .into()
        })
    }

    /// Bound recipe of a placeholder; unbound placeholders are an error
    pub fn recipe(&self, id: TokenId) -> SynthResult<&Expr> {
        let entry = self.get(id)?;
        entry.recipe.as_ref().ok_or_else(|| {
            ValidationError::new(
                Rule::Unbound,
                entry.display_name(),
                format!("placeholder {} was never bound", entry.display_name()),
            )
            .into()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn name_of(&self, id: TokenId) -> String {
        self.get(id)
            .map(Placeholder::display_name)
            .unwrap_or_else(|_| id.to_string())
    }

    /// Chain of placeholders leading from `expr` to `goal`, if any
    fn path_to(&self, expr: &Expr, goal: TokenId) -> Option<Vec<TokenId>> {
        let mut seen = HashSet::new();
        let mut path = Vec::new();
        for t in expr.tokens() {
            if self.search(t, goal, &mut seen, &mut path) {
                return Some(path);
            }
        }
        None
    }

    fn search(
        &self,
        current: TokenId,
        goal: TokenId,
        seen: &mut HashSet<TokenId>,
        path: &mut Vec<TokenId>,
    ) -> bool {
        path.push(current);
        if current == goal {
            return true;
        }
        if seen.insert(current) {
            if let Some(recipe) = self
                .entries
                .get(current.0 as usize)
                .and_then(|p| p.recipe.as_ref())
            {
                for next in recipe.tokens() {
                    if self.search(next, goal, seen, path) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }
}
