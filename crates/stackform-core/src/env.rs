//! Deployment environments
//!
//! `StackEnv` is what a stack knows statically about where it will be
//! deployed. `ResourceEnvironment` is the account/region pair of one
//! resource, literal when known at construction time and deferred otherwise.

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Pseudo};

/// Statically known deployment coordinates of a stack.
///
/// Unset fields stay deploy-time values (`AWS::Region`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEnv {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl StackEnv {
    /// Environment-agnostic stack: every coordinate is deferred
    pub fn agnostic() -> Self {
        Self::default()
    }

    pub fn pinned(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
            partition: None,
        }
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Literal value of a pseudo parameter, if this environment pins it
    pub fn pseudo_value(&self, pseudo: Pseudo, stack_name: &str) -> Option<String> {
        match pseudo {
            Pseudo::Partition => self.partition.clone(),
            Pseudo::Region => self.region.clone(),
            Pseudo::AccountId => self.account.clone(),
            Pseudo::StackName => Some(stack_name.to_string()),
            Pseudo::UrlSuffix => self.partition.as_deref().map(url_suffix).map(str::to_string),
        }
    }

    pub fn account_expr(&self) -> Expr {
        literal_or(&self.account, Pseudo::AccountId)
    }

    pub fn region_expr(&self) -> Expr {
        literal_or(&self.region, Pseudo::Region)
    }

    pub fn partition_expr(&self) -> Expr {
        literal_or(&self.partition, Pseudo::Partition)
    }

    pub fn resource_environment(&self) -> ResourceEnvironment {
        ResourceEnvironment {
            account: self.account_expr(),
            region: self.region_expr(),
        }
    }

    /// Whether two environments are provably different.
    ///
    /// Only literal coordinates are compared: an agnostic side never
    /// conflicts.
    pub fn conflicts_with(&self, other: &StackEnv) -> bool {
        differs(&self.account, &other.account) || differs(&self.region, &other.region)
    }
}

fn differs(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x != y)
}

fn literal_or(value: &Option<String>, pseudo: Pseudo) -> Expr {
    match value {
        Some(v) => Expr::string(v.clone()),
        None => Expr::Pseudo(pseudo),
    }
}

fn url_suffix(partition: &str) -> &'static str {
    match partition {
        "aws-cn" => "amazonaws.com.cn",
        _ => "amazonaws.com",
    }
}

/// Account and region a resource lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEnvironment {
    pub account: Expr,
    pub region: Expr,
}

impl ResourceEnvironment {
    /// Both coordinates are concrete strings
    pub fn is_literal(&self) -> bool {
        self.account.is_literal() && self.region.is_literal()
    }

    /// Is this resource in the stack's account?
    ///
    /// `Some` when it can be decided at construction time, `None` when the
    /// answer is only known at deploy time.
    pub fn same_account(&self, stack: &StackEnv) -> Option<bool> {
        same_coordinate(&self.account, &stack.account_expr())
    }

    /// Is this resource in the stack's region?
    pub fn same_region(&self, stack: &StackEnv) -> Option<bool> {
        same_coordinate(&self.region, &stack.region_expr())
    }
}

fn same_coordinate(resource: &Expr, stack: &Expr) -> Option<bool> {
    if resource == stack {
        return Some(true);
    }
    match (resource.as_str(), stack.as_str()) {
        (Some(a), Some(b)) => Some(a == b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agnostic_defaults_to_pseudo() {
        let env = StackEnv::agnostic();
        assert_eq!(env.account_expr(), Expr::Pseudo(Pseudo::AccountId));
        assert_eq!(env.region_expr(), Expr::Pseudo(Pseudo::Region));
        assert_eq!(env.pseudo_value(Pseudo::Region, "S"), None);
        assert_eq!(
            env.pseudo_value(Pseudo::StackName, "S"),
            Some("S".to_string())
        );
    }

    #[test]
    fn test_pinned_env_is_literal() {
        let env = StackEnv::pinned("123456789012", "eu-west-1");
        assert_eq!(env.account_expr(), Expr::string("123456789012"));
        assert!(env.resource_environment().is_literal());
    }

    #[test]
    fn test_url_suffix_follows_partition() {
        let env = StackEnv::agnostic().with_partition("aws-cn");
        assert_eq!(
            env.pseudo_value(Pseudo::UrlSuffix, "S").as_deref(),
            Some("amazonaws.com.cn")
        );
    }

    #[test]
    fn test_same_account_decisions() {
        let stack = StackEnv::agnostic();
        let local = stack.resource_environment();
        assert_eq!(local.same_account(&stack), Some(true));

        let foreign = ResourceEnvironment {
            account: Expr::string("myAccount"),
            region: Expr::string("us-west-1"),
        };
        assert_eq!(foreign.same_account(&stack), None);

        let pinned = StackEnv::pinned("myAccount", "us-east-1");
        assert_eq!(foreign.same_account(&pinned), Some(true));
        assert_eq!(foreign.same_region(&pinned), Some(false));
    }

    #[test]
    fn test_conflicts_only_on_literals() {
        let a = StackEnv::pinned("1", "us-east-1");
        let b = StackEnv::pinned("2", "us-east-1");
        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&StackEnv::agnostic()));
    }
}
