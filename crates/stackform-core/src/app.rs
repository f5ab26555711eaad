//! App: several stacks synthesized together
//!
//! ## Cross-stack references
//!
//! ```text
//! Consumer: {"Ref": Producer/Bus}      Producer
//!        ↓ resolve                          ↑ export
//! {"Fn::ImportValue": "Producer:ExportsOutputRefBus…"}
//!                                      Outputs.ExportsOutputRefBus… =
//!                                        { Value: {"Ref": "Bus"}, Export.Name }
//! ```
//!
//! Consumers depend on their producers; templates are emitted producers
//! first.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::expr::Expr;
use crate::graph::DependencyGraph;
use crate::naming::export_output_id;
use crate::resolve::{render, CrossReference};
use crate::stack::Stack;
use crate::template::Template;

#[derive(Debug, Clone, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

/// Synthesis result of a whole app.
#[derive(Debug, Clone)]
pub struct Assembly {
    templates: BTreeMap<String, Template>,
    order: Vec<String>,
}

impl Assembly {
    pub fn template(&self, stack: &str) -> Option<&Template> {
        self.templates.get(stack)
    }

    /// Stack names, producers before consumers
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// `(stack name, template)` in deployment order
    pub fn templates(&self) -> impl Iterator<Item = (&str, &Template)> {
        self.order
            .iter()
            .filter_map(|name| self.templates.get(name).map(|t| (name.as_str(), t)))
    }
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, stack: Stack) -> SynthResult<()> {
        if self.stack(stack.name()).is_some() {
            return Err(ValidationError::new(
                Rule::DuplicateId,
                stack.name(),
                format!("stack '{}' is already part of this app", stack.name()),
            )
            .into());
        }
        self.stacks.push(stack);
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    pub fn stack_mut(&mut self, name: &str) -> Option<&mut Stack> {
        self.stacks.iter_mut().find(|s| s.name() == name)
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.iter()
    }

    /// Override the folding flag of every stack
    pub fn set_fold(&mut self, fold: bool) {
        for s in &mut self.stacks {
            s.set_fold(fold);
        }
    }

    pub fn synth(&self) -> SynthResult<Assembly> {
        let mut templates = BTreeMap::new();
        let mut imports: Vec<CrossReference> = Vec::new();
        let mut graph = DependencyGraph::new();

        for stack in &self.stacks {
            graph.add_node(stack.name());
            let synthesized = stack.synthesize()?;
            templates.insert(stack.name().to_string(), synthesized.template);
            imports.extend(synthesized.imports);
        }

        for xref in &imports {
            let producer = self.producer_of(xref)?;
            graph.add_edge(&xref.consumer, producer.name())?;

            let value = match &xref.attribute {
                Some(attr) => Expr::get_att(xref.target.clone(), attr.as_str()),
                None => Expr::reference(xref.target.clone()),
            };
            if let Some(template) = templates.get_mut(producer.name()) {
                template.add_export(
                    &export_output_id(&xref.export_name),
                    render(&value),
                    &xref.export_name,
                );
            }
        }

        let order = graph.order()?;
        info!(stacks = order.len(), exports = imports.len(), "synthesized app");
        Ok(Assembly { templates, order })
    }

    /// Stack owning the target of a cross-stack reference, checked for reachability
    fn producer_of(&self, xref: &CrossReference) -> SynthResult<&Stack> {
        let producer = self.stack(&xref.target.stack).ok_or_else(|| {
            SynthError::from(ValidationError::new(
                Rule::UnknownTarget,
                xref.target.to_string(),
                format!(
                    "stack '{}' references '{}', but stack '{}' is not part of this app",
                    xref.consumer, xref.target, xref.target.stack
                ),
            ))
        })?;

        if producer.record(&xref.target.logical_id).is_none() {
            return Err(ValidationError::new(
                Rule::UnknownTarget,
                xref.target.to_string(),
                format!(
                    "stack '{}' references '{}', which does not exist",
                    xref.consumer, xref.target
                ),
            )
            .into());
        }

        if let Some(consumer) = self.stack(&xref.consumer) {
            if consumer.env().conflicts_with(producer.env()) {
                return Err(ValidationError::new(
                    Rule::CrossEnvironment,
                    xref.target.to_string(),
                    format!(
                        "stack '{}' cannot reference '{}': stacks are deployed to different environments",
                        xref.consumer, xref.target
                    ),
                )
                .into());
            }
        }

        Ok(producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::StackEnv;
    use crate::expr::LogicalRef;
    use crate::resource::ResourceHandle;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn topic(stack: &mut Stack) -> ResourceHandle {
        stack
            .add_resource::<&str, _>(&["Topic"], "AWS::SNS::Topic", [])
            .unwrap()
    }

    #[test]
    fn test_cross_stack_ref_becomes_import_and_export() {
        let mut producer = Stack::new("Producer");
        let t = topic(&mut producer);
        let mut consumer = Stack::new("Consumer");
        consumer
            .add_resource(&["Sub"], "AWS::SNS::Subscription", [("TopicArn", t.reference())])
            .unwrap();

        let mut app = App::new();
        app.add_stack(consumer).unwrap();
        app.add_stack(producer).unwrap();
        let assembly = app.synth().unwrap();

        assert_eq!(assembly.order(), ["Producer".to_string(), "Consumer".to_string()]);

        let imported = &assembly.template("Consumer").unwrap().resource("Sub").unwrap()
            ["Properties"]["TopicArn"]["Fn::ImportValue"];
        let name = imported.as_str().unwrap();
        assert!(name.starts_with("Producer:ExportsOutputRefTopic"));

        let output = assembly
            .template("Producer")
            .unwrap()
            .output(&export_output_id(name))
            .unwrap();
        assert_eq!(output, &json!({"Value": {"Ref": "Topic"}, "Export": {"Name": name}}));
    }

    #[test]
    fn test_stack_cycle_rejected() {
        let mut a = Stack::new("A");
        let mut b = Stack::new("B");
        let ta = topic(&mut a);
        let tb = topic(&mut b);
        a.add_resource(&["Sub"], "AWS::SNS::Subscription", [("T", tb.reference())])
            .unwrap();
        b.add_resource(&["Sub"], "AWS::SNS::Subscription", [("T", ta.reference())])
            .unwrap();

        let mut app = App::new();
        app.add_stack(a).unwrap();
        app.add_stack(b).unwrap();
        assert!(matches!(
            app.synth().unwrap_err(),
            SynthError::CyclicReference { .. }
        ));
    }

    #[test]
    fn test_cross_environment_rejected() {
        let mut producer = Stack::with_env("Producer", StackEnv::pinned("111111111111", "us-east-1"));
        let t = topic(&mut producer);
        let mut consumer = Stack::with_env("Consumer", StackEnv::pinned("222222222222", "us-east-1"));
        consumer
            .add_resource(&["Sub"], "AWS::SNS::Subscription", [("T", t.reference())])
            .unwrap();

        let mut app = App::new();
        app.add_stack(producer).unwrap();
        app.add_stack(consumer).unwrap();
        assert_eq!(app.synth().unwrap_err().rule(), Some(Rule::CrossEnvironment));
    }

    #[test]
    fn test_reference_to_missing_stack() {
        let mut consumer = Stack::new("Consumer");
        consumer
            .add_resource(
                &["Sub"],
                "AWS::SNS::Subscription",
                [("T", Expr::reference(LogicalRef::new("Ghost", "Topic")))],
            )
            .unwrap();
        let mut app = App::new();
        app.add_stack(consumer).unwrap();
        let err = app.synth().unwrap_err();
        assert_eq!(err.rule(), Some(Rule::UnknownTarget));
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn test_duplicate_stack_name() {
        let mut app = App::new();
        app.add_stack(Stack::new("S")).unwrap();
        assert_eq!(
            app.add_stack(Stack::new("S")).unwrap_err().rule(),
            Some(Rule::DuplicateId)
        );
    }
}
