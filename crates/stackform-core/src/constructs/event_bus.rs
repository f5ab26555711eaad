//! EventBridge event buses: create, import, archive, grant

use crate::arn::{ArnComponents, ArnFormat};
use crate::env::ResourceEnvironment;
use crate::error::SynthResult;
use crate::expr::Expr;
use crate::naming::unique_id;
use crate::resource::ResourceHandle;
use crate::stack::Stack;
use crate::validate::validate_event_bus_names;

use super::iam::{grant_target, Grant, GrantTarget, PolicyStatement, Role};

const PUT_EVENTS: &str = "events:PutEvents";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBusProps {
    pub event_bus_name: Option<Expr>,
    /// Partner event source; also becomes the bus name
    pub event_source_name: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveProps {
    pub archive_name: Option<Expr>,
    pub description: Option<Expr>,
    pub event_pattern: Expr,
    /// 0 keeps events indefinitely
    pub retention_days: u32,
}

impl Default for ArchiveProps {
    fn default() -> Self {
        Self {
            archive_name: None,
            description: None,
            event_pattern: Expr::Map(Default::default()),
            retention_days: 0,
        }
    }
}

/// A bus owned by this stack or imported by ARN / name.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBus {
    /// Construct id, used as the scope of archives
    id: String,
    /// Set only for buses created in this stack
    pub handle: Option<ResourceHandle>,
    pub name: Expr,
    pub arn: Expr,
    pub env: ResourceEnvironment,
}

impl EventBus {
    pub fn new(stack: &mut Stack, id: &str, props: EventBusProps) -> SynthResult<Self> {
        validate_event_bus_names(props.event_bus_name.as_ref(), props.event_source_name.as_ref())?;

        let name = match (&props.event_source_name, &props.event_bus_name) {
            (Some(source), _) => source.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => Expr::string(unique_id(&[id])?),
        };

        let mut properties = vec![("Name", name)];
        if let Some(source) = props.event_source_name {
            properties.push(("EventSourceName", source));
        }

        let handle = stack.add_resource(&[id, "Resource"], "AWS::Events::EventBus", properties)?;
        Ok(Self {
            id: id.to_string(),
            name: handle.reference(),
            arn: handle.attribute("Arn"),
            env: stack.env().resource_environment(),
            handle: Some(handle),
        })
    }

    /// Import a bus from its ARN; name and environment come from the ARN
    pub fn from_event_bus_arn(stack: &Stack, id: &str, arn: Expr) -> SynthResult<Self> {
        let parts = stack.split_arn(&arn, ArnFormat::SlashResourceName)?;
        let env = parts.environment(stack.env());
        let name = parts.resource_name.unwrap_or(parts.resource);
        Ok(Self {
            id: id.to_string(),
            handle: None,
            name,
            arn,
            env,
        })
    }

    /// Import a bus of this stack's environment by name
    pub fn from_event_bus_name(stack: &Stack, id: &str, name: impl Into<Expr>) -> Self {
        let name = name.into();
        let arn = stack.format_arn(
            &ArnComponents::new("events", "event-bus").resource_name(name.clone()),
        );
        Self {
            id: id.to_string(),
            handle: None,
            name,
            arn,
            env: stack.env().resource_environment(),
        }
    }

    /// Emit an `AWS::Events::Archive` of this bus's events
    pub fn archive(&self, stack: &mut Stack, id: &str, props: ArchiveProps) -> SynthResult<ResourceHandle> {
        let description = props.description.unwrap_or_else(|| {
            Expr::concat(vec![
                "Event Archive for ".into(),
                self.name.clone(),
                " Event Bus".into(),
            ])
        });

        let mut properties = vec![
            ("SourceArn", self.arn.clone()),
            ("Description", description),
            ("EventPattern", props.event_pattern),
            ("RetentionDays", Expr::from(props.retention_days)),
        ];
        if let Some(name) = props.archive_name {
            properties.push(("ArchiveName", name));
        }

        stack.add_resource(
            &[self.id.as_str(), id, "Resource"],
            "AWS::Events::Archive",
            properties,
        )
    }

    /// Allow `role` to put events on this bus
    pub fn grant_put_events_to(&self, stack: &mut Stack, role: &mut Role) -> SynthResult<Grant> {
        let statement = PolicyStatement::allow([PUT_EVENTS], vec![self.arn.clone()]);
        role.add_to_policy(stack, statement.clone())?;
        Ok(Grant {
            statement,
            target: grant_target(&self.env, stack.env()),
        })
    }

    /// Allow `role` to put events on any bus
    pub fn grant_all_put_events(stack: &mut Stack, role: &mut Role) -> SynthResult<Grant> {
        let statement = PolicyStatement::allow([PUT_EVENTS], vec![Expr::string("*")]);
        role.add_to_policy(stack, statement.clone())?;
        Ok(Grant {
            statement,
            target: GrantTarget::Identity,
        })
    }
}
