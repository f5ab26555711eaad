//! Minimal IAM policy builder
//!
//! Statements and documents render to `Expr::Map` so that deferred ARNs
//! flow straight into resource properties. Single actions, resources and
//! principals render unwrapped, lists otherwise.

use crate::env::{ResourceEnvironment, StackEnv};
use crate::error::SynthResult;
use crate::expr::Expr;
use crate::naming::unique_id;
use crate::resource::ResourceHandle;
use crate::stack::Stack;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    /// `{"Service": "lambda.amazonaws.com"}`
    Service(String),
    /// `{"AWS": <account or role ARN>}`
    Aws(Expr),
}

impl Principal {
    pub fn service(name: impl Into<String>) -> Self {
        Principal::Service(name.into())
    }

    fn key(&self) -> &'static str {
        match self {
            Principal::Service(_) => "Service",
            Principal::Aws(_) => "AWS",
        }
    }

    fn value(&self) -> Expr {
        match self {
            Principal::Service(s) => Expr::string(s.clone()),
            Principal::Aws(e) => e.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
    pub principals: Vec<Principal>,
}

impl PolicyStatement {
    pub fn allow<A, S>(actions: A, resources: Vec<Expr>) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
            principals: Vec::new(),
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    pub fn to_expr(&self) -> Expr {
        let mut entries: Vec<(&str, Expr)> = vec![
            ("Effect", Expr::string(self.effect.as_str())),
            (
                "Action",
                one_or_many(self.actions.iter().map(|a| Expr::string(a.clone())).collect()),
            ),
        ];
        if !self.resources.is_empty() {
            entries.push(("Resource", one_or_many(self.resources.clone())));
        }
        if !self.principals.is_empty() {
            let mut by_key: Vec<(&str, Vec<Expr>)> = Vec::new();
            for p in &self.principals {
                match by_key.iter_mut().find(|(k, _)| *k == p.key()) {
                    Some((_, values)) => values.push(p.value()),
                    None => by_key.push((p.key(), vec![p.value()])),
                }
            }
            entries.push((
                "Principal",
                Expr::map(by_key.into_iter().map(|(k, v)| (k, one_or_many(v)))),
            ));
        }
        Expr::map(entries)
    }
}

fn one_or_many(mut items: Vec<Expr>) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        Expr::list(items)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    pub fn to_expr(&self) -> Expr {
        Expr::map([
            (
                "Statement",
                Expr::list(self.statements.iter().map(PolicyStatement::to_expr).collect()),
            ),
            ("Version", Expr::string(POLICY_VERSION)),
        ])
    }
}

/// Where a grant's statement has to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantTarget {
    /// Same account: the principal's identity policy is enough
    Identity,
    /// Different or undecidable account: the resource policy must allow it too
    IdentityAndResource,
}

/// Decide the grant target from the resource's environment.
pub fn grant_target(resource: &ResourceEnvironment, stack: &StackEnv) -> GrantTarget {
    match resource.same_account(stack) {
        Some(true) => GrantTarget::Identity,
        Some(false) | None => GrantTarget::IdentityAndResource,
    }
}

/// Outcome of a grant: the statement and where it must be attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub statement: PolicyStatement,
    pub target: GrantTarget,
}

/// An IAM role with an inline default policy created on first use.
#[derive(Debug, Clone)]
pub struct Role {
    pub handle: ResourceHandle,
    id: String,
    default_policy: Option<ResourceHandle>,
    statements: Vec<PolicyStatement>,
}

impl Role {
    pub fn new(stack: &mut Stack, id: &str, assumed_by: Principal) -> SynthResult<Self> {
        let trust = PolicyDocument::new(vec![PolicyStatement::allow(["sts:AssumeRole"], vec![])
            .with_principal(assumed_by)]);
        let handle = stack.add_resource(
            &[id, "Resource"],
            "AWS::IAM::Role",
            [("AssumeRolePolicyDocument", trust.to_expr())],
        )?;
        Ok(Self {
            handle,
            id: id.to_string(),
            default_policy: None,
            statements: Vec::new(),
        })
    }

    pub fn arn(&self) -> Expr {
        self.handle.attribute("Arn")
    }

    /// Append a statement to the role's default `AWS::IAM::Policy`
    pub fn add_to_policy(&mut self, stack: &mut Stack, statement: PolicyStatement) -> SynthResult<()> {
        let mut statements = self.statements.clone();
        statements.push(statement);
        let document = PolicyDocument::new(statements.clone()).to_expr();

        match &self.default_policy {
            Some(policy) => stack.set_property(policy, "PolicyDocument", document)?,
            None => {
                let policy_name = unique_id(&[self.id.as_str(), "DefaultPolicy"])?;
                let policy = stack.add_resource(
                    &[self.id.as_str(), "DefaultPolicy", "Resource"],
                    "AWS::IAM::Policy",
                    [
                        ("PolicyDocument", document),
                        ("PolicyName", Expr::string(policy_name)),
                        ("Roles", Expr::list(vec![self.handle.reference()])),
                    ],
                )?;
                self.default_policy = Some(policy);
            }
        }
        self.statements = statements;
        Ok(())
    }

    pub fn default_policy(&self) -> Option<&ResourceHandle> {
        self.default_policy.as_ref()
    }
}
