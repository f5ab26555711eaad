//! Singleton Lambda function
//!
//! A function plus its execution role, created once per stack for a given
//! uuid no matter how many constructs ask for it.

use crate::error::SynthResult;
use crate::expr::{Expr, Pseudo};
use crate::resource::ResourceHandle;
use crate::stack::Stack;

use super::iam::{PolicyDocument, PolicyStatement, Principal};

const BASIC_EXECUTION_POLICY: &str = ":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionProps {
    /// Inline source, emitted as `Code.ZipFile`
    pub code: Expr,
    pub handler: String,
    pub runtime: String,
    pub timeout_secs: Option<u32>,
    /// Distinguishes functions sharing a uuid but serving different purposes
    pub lambda_purpose: Option<String>,
}

impl FunctionProps {
    pub fn inline(code: impl Into<Expr>, handler: &str, runtime: &str) -> Self {
        Self {
            code: code.into(),
            handler: handler.to_string(),
            runtime: runtime.to_string(),
            timeout_secs: None,
            lambda_purpose: None,
        }
    }

    pub fn timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingletonFunction {
    pub function: ResourceHandle,
}

impl SingletonFunction {
    /// Dedup key and construct id for a uuid (dashes removed)
    pub fn construct_name(uuid: &str, lambda_purpose: Option<&str>) -> String {
        let slug = uuid.replace('-', "");
        format!("SingletonLambda{}{}", slug, lambda_purpose.unwrap_or(""))
    }

    /// Return the function for `uuid`, creating it with `props` on first use.
    pub fn ensure(stack: &mut Stack, uuid: &str, props: &FunctionProps) -> SynthResult<Self> {
        let name = Self::construct_name(uuid, props.lambda_purpose.as_deref());
        let function = stack.singleton(&name, |stack| create(stack, &name, props))?;
        Ok(Self { function })
    }

    pub fn arn(&self) -> Expr {
        self.function.attribute("Arn")
    }

    pub fn function_name(&self) -> Expr {
        self.function.reference()
    }
}

fn create(stack: &mut Stack, name: &str, props: &FunctionProps) -> SynthResult<ResourceHandle> {
    let trust = PolicyDocument::new(vec![PolicyStatement::allow(["sts:AssumeRole"], vec![])
        .with_principal(Principal::service("lambda.amazonaws.com"))]);
    let managed_policy = Expr::concat(vec![
        "arn:".into(),
        Expr::pseudo(Pseudo::Partition),
        BASIC_EXECUTION_POLICY.into(),
    ]);

    let role = stack.add_resource(
        &[name, "ServiceRole", "Resource"],
        "AWS::IAM::Role",
        [
            ("AssumeRolePolicyDocument", trust.to_expr()),
            ("ManagedPolicyArns", Expr::list(vec![managed_policy])),
        ],
    )?;

    let mut properties = vec![
        ("Code", Expr::map([("ZipFile", props.code.clone())])),
        ("Handler", Expr::string(props.handler.clone())),
        ("Role", role.attribute("Arn")),
        ("Runtime", Expr::string(props.runtime.clone())),
    ];
    if let Some(t) = props.timeout_secs {
        properties.push(("Timeout", Expr::from(t)));
    }

    let function = stack.add_resource(&[name, "Resource"], "AWS::Lambda::Function", properties)?;
    stack.add_dependency(&function, &role)?;
    Ok(function)
}
