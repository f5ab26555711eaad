//! Custom resources backed by a Lambda function or an SNS topic

use std::collections::BTreeMap;

use crate::error::SynthResult;
use crate::expr::Expr;
use crate::lifecycle::{lifecycle_for, RemovalPolicy};
use crate::resource::ResourceHandle;
use crate::stack::Stack;
use crate::validate::validate_custom_resource_type;

use super::function::SingletonFunction;

pub const DEFAULT_RESOURCE_TYPE: &str = "AWS::CloudFormation::CustomResource";

/// Where the custom resource's lifecycle events are delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    Lambda(ResourceHandle),
    Topic(ResourceHandle),
}

impl Provider {
    pub fn from_function(function: &SingletonFunction) -> Self {
        Provider::Lambda(function.function.clone())
    }

    pub fn from_topic(topic: &ResourceHandle) -> Self {
        Provider::Topic(topic.clone())
    }

    /// Function ARN or topic ARN (a topic's `Ref` is its ARN)
    pub fn service_token(&self) -> Expr {
        match self {
            Provider::Lambda(f) => f.attribute("Arn"),
            Provider::Topic(t) => t.reference(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomResourceProps {
    pub provider: Provider,
    /// Must start with `Custom::` when set
    pub resource_type: Option<String>,
    pub properties: BTreeMap<String, Expr>,
    /// Defaults to destroy
    pub removal_policy: Option<RemovalPolicy>,
}

impl CustomResourceProps {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            resource_type: None,
            properties: BTreeMap::new(),
            removal_policy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomResource {
    pub handle: ResourceHandle,
}

impl CustomResource {
    pub fn new(stack: &mut Stack, id: &str, props: CustomResourceProps) -> SynthResult<Self> {
        let resource_type = match &props.resource_type {
            Some(t) => {
                validate_custom_resource_type(t)?;
                t.as_str()
            }
            None => DEFAULT_RESOURCE_TYPE,
        };

        let policy = props.removal_policy.unwrap_or(RemovalPolicy::Destroy);
        lifecycle_for(Some(policy), resource_type)?;

        let mut properties = props.properties.clone();
        properties.insert("ServiceToken".to_string(), props.provider.service_token());

        let handle = stack.add_resource(&[id, "Resource", "Default"], resource_type, properties)?;
        stack.apply_removal_policy(&handle, Some(policy))?;
        Ok(Self { handle })
    }

    pub fn get_att(&self, attribute: &str) -> Expr {
        self.handle.attribute(attribute)
    }

    /// Physical id of the custom resource
    pub fn reference(&self) -> Expr {
        self.handle.reference()
    }
}
