//! Stack: the document-construction context
//!
//! A stack owns everything one template is built from: resource records,
//! the placeholder table, the singleton registry, the logical-id allocator
//! and the dependency graph. Every construction call validates eagerly and
//! leaves the stack untouched on failure.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::arn::{format_arn, parse_arn, ArnComponents, ArnFormat};
use crate::conditions::ConditionExpr;
use crate::env::StackEnv;
use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::expr::{Expr, LogicalRef};
use crate::graph::DependencyGraph;
use crate::lifecycle::{with_removal_policy, RemovalPolicy};
use crate::naming::LogicalIdAllocator;
use crate::registry::SingletonRegistry;
use crate::resolve::{
    render, typecheck, undefined_conditions, CrossReference, Environment, KnownValues, Resolver,
};
use crate::resource::{with_dependency, ResourceHandle, ResourceRecord};
use crate::template::Template;
use crate::token::{TokenId, TokenTable};

/// A stack output.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub value: Expr,
    pub export_name: Option<String>,
    pub description: Option<String>,
}

/// Template plus the cross-stack references it consumes.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub template: Template,
    pub imports: Vec<CrossReference>,
}

#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: StackEnv,
    fold: bool,
    resources: BTreeMap<String, ResourceRecord>,
    ids: LogicalIdAllocator,
    tokens: TokenTable,
    singletons: SingletonRegistry<ResourceHandle>,
    conditions: BTreeMap<String, ConditionExpr>,
    outputs: BTreeMap<String, Output>,
    known: KnownValues,
    graph: DependencyGraph,
}

impl Stack {
    /// Environment-agnostic stack
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_env(name, StackEnv::agnostic())
    }

    pub fn with_env(name: impl Into<String>, env: StackEnv) -> Self {
        Self {
            name: name.into(),
            env,
            fold: true,
            resources: BTreeMap::new(),
            ids: LogicalIdAllocator::new(),
            tokens: TokenTable::new(),
            singletons: SingletonRegistry::new(),
            conditions: BTreeMap::new(),
            outputs: BTreeMap::new(),
            known: KnownValues::new(),
            graph: DependencyGraph::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &StackEnv {
        &self.env
    }

    pub fn fold(&self) -> bool {
        self.fold
    }

    /// Enable or disable constant folding during synthesis
    pub fn set_fold(&mut self, fold: bool) {
        self.fold = fold;
    }

    pub fn known_values(&self) -> &KnownValues {
        &self.known
    }

    /// Values declared known ahead of deploy time
    pub fn known_values_mut(&mut self) -> &mut KnownValues {
        &mut self.known
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    /// Add a resource at a construct path.
    ///
    /// The logical id is derived from the path. Properties are type-checked
    /// and their same-stack references become dependency edges.
    pub fn add_resource<K, I>(
        &mut self,
        path: &[&str],
        resource_type: &str,
        properties: I,
    ) -> SynthResult<ResourceHandle>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Expr)>,
    {
        let properties: BTreeMap<String, Expr> = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        for value in properties.values() {
            typecheck(value)?;
        }

        let mut ids = self.ids.clone();
        let logical_id = ids.allocate(path)?;

        let mut record = ResourceRecord::new(&logical_id, resource_type, path.join("/"));
        record.properties = properties;

        let edges = self.edges_of(&record);
        self.graph.set_edges(&logical_id, &edges)?;

        debug!(stack = %self.name, logical_id = %logical_id, resource_type, "added resource");
        self.ids = ids;
        self.resources.insert(logical_id.clone(), record);
        Ok(ResourceHandle {
            stack: self.name.clone(),
            logical_id,
            resource_type: resource_type.to_string(),
        })
    }

    /// Set (or replace) one property of an existing resource
    pub fn set_property(
        &mut self,
        handle: &ResourceHandle,
        key: &str,
        value: Expr,
    ) -> SynthResult<()> {
        typecheck(&value)?;
        let mut record = self.record_of(handle)?.clone();
        record.properties.insert(key.to_string(), value);
        let edges = self.edges_of(&record);
        self.graph.set_edges(&record.logical_id, &edges)?;
        self.resources.insert(record.logical_id.clone(), record);
        Ok(())
    }

    /// Make `dependent` depend explicitly on `dependency`
    pub fn add_dependency(
        &mut self,
        dependent: &ResourceHandle,
        dependency: &ResourceHandle,
    ) -> SynthResult<()> {
        self.record_of(dependency)?;
        let mut record = self.record_of(dependent)?.clone();
        with_dependency(&mut record, &dependency.logical_id)?;
        self.graph
            .add_edge(&record.logical_id, &dependency.logical_id)?;
        self.resources.insert(record.logical_id.clone(), record);
        Ok(())
    }

    pub fn apply_removal_policy(
        &mut self,
        handle: &ResourceHandle,
        policy: Option<RemovalPolicy>,
    ) -> SynthResult<()> {
        let record = self.record_mut(handle)?;
        with_removal_policy(record, policy)
    }

    /// Attach a named condition to a resource
    pub fn set_resource_condition(
        &mut self,
        handle: &ResourceHandle,
        condition: &str,
    ) -> SynthResult<()> {
        let record = self.record_mut(handle)?;
        record.condition = Some(condition.to_string());
        Ok(())
    }

    pub fn record(&self, logical_id: &str) -> Option<&ResourceRecord> {
        self.resources.get(logical_id)
    }

    pub fn handle(&self, logical_id: &str) -> Option<ResourceHandle> {
        self.resources.get(logical_id).map(|r| ResourceHandle {
            stack: self.name.clone(),
            logical_id: r.logical_id.clone(),
            resource_type: r.resource_type.clone(),
        })
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.resources.values()
    }

    fn record_of(&self, handle: &ResourceHandle) -> SynthResult<&ResourceRecord> {
        if handle.stack != self.name {
            return Err(foreign_handle(handle, &self.name));
        }
        self.resources
            .get(&handle.logical_id)
            .ok_or_else(|| unknown_resource(&handle.logical_id, &self.name))
    }

    fn record_mut(&mut self, handle: &ResourceHandle) -> SynthResult<&mut ResourceRecord> {
        if handle.stack != self.name {
            return Err(foreign_handle(handle, &self.name));
        }
        let name = self.name.clone();
        self.resources
            .get_mut(&handle.logical_id)
            .ok_or_else(|| unknown_resource(&handle.logical_id, &name))
    }

    /// Same-stack logical ids a record depends on, explicit or through references
    fn edges_of(&self, record: &ResourceRecord) -> BTreeSet<String> {
        let mut edges = record.depends_on.clone();
        for expr in record.expressions() {
            edges.extend(self.local_references(expr));
        }
        edges
    }

    /// Same-stack targets reachable from `expr`, following placeholder recipes
    fn local_references(&self, expr: &Expr) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let reached = self.reachable_recipes(expr);
        let recipes = reached.iter().filter_map(|(_, r)| *r);
        for e in std::iter::once(expr).chain(recipes) {
            for target in e.references() {
                if target.stack == self.name {
                    out.insert(target.logical_id.clone());
                }
            }
        }
        out
    }

    /// Every placeholder reachable from `expr` through recipes, with its
    /// recipe when bound
    fn reachable_recipes<'a>(&'a self, expr: &'a Expr) -> Vec<(TokenId, Option<&'a Expr>)> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = vec![expr];
        while let Some(e) = pending.pop() {
            for t in e.tokens() {
                if seen.insert(t) {
                    let recipe = self.tokens.recipe(t).ok();
                    if let Some(r) = recipe {
                        pending.push(r);
                    }
                    out.push((t, recipe));
                }
            }
        }
        out
    }

    // -------------------------------------------------------------------------
    // Placeholders
    // -------------------------------------------------------------------------

    /// Declare a placeholder with its recipe and return the leaf expression
    pub fn placeholder(&mut self, hint: Option<&str>, recipe: Expr) -> SynthResult<Expr> {
        typecheck(&recipe)?;
        self.tokens.define(hint, recipe).map(Expr::token)
    }

    /// Declare a placeholder whose recipe is bound later
    pub fn declare_placeholder(&mut self, hint: Option<&str>) -> TokenId {
        self.tokens.declare(hint)
    }

    /// Bind a declared placeholder.
    ///
    /// Resources already using the placeholder get their dependency edges
    /// recomputed; a binding that would close a reference cycle is undone.
    pub fn bind_placeholder(&mut self, id: TokenId, recipe: Expr) -> SynthResult<()> {
        typecheck(&recipe)?;
        let previous = self.tokens.clone();
        self.tokens.bind(id, recipe)?;

        let mut graph = self.graph.clone();
        let rewired = self
            .resources
            .values()
            .filter(|record| {
                record
                    .expressions()
                    .any(|e| self.reachable_recipes(e).iter().any(|(t, _)| *t == id))
            })
            .try_for_each(|record| graph.set_edges(&record.logical_id, &self.edges_of(record)));

        match rewired {
            Ok(()) => {
                self.graph = graph;
                Ok(())
            }
            Err(err) => {
                self.tokens = previous;
                Err(err)
            }
        }
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    // -------------------------------------------------------------------------
    // Singletons
    // -------------------------------------------------------------------------

    /// Return the resource registered under `key`, creating it on first use.
    ///
    /// The factory may add any number of resources to this stack; its
    /// returned handle is what later calls with the same key receive.
    pub fn singleton(
        &mut self,
        key: &str,
        factory: impl FnOnce(&mut Stack) -> SynthResult<ResourceHandle>,
    ) -> SynthResult<ResourceHandle> {
        if let Some(existing) = self.singletons.get(key) {
            debug!(key, "singleton hit");
            return Ok(existing.clone());
        }
        let handle = factory(self)?;
        Ok(self.singletons.insert(key, handle))
    }

    pub fn has_singleton(&self, key: &str) -> bool {
        self.singletons.contains(key)
    }

    // -------------------------------------------------------------------------
    // Conditions & outputs
    // -------------------------------------------------------------------------

    pub fn add_condition(&mut self, name: &str, condition: ConditionExpr) -> SynthResult<()> {
        if self.conditions.contains_key(name) {
            return Err(ValidationError::new(
                Rule::DuplicateId,
                name,
                format!("condition '{}' is already defined in stack '{}'", name, self.name),
            )
            .into());
        }
        for operand in condition.operands() {
            typecheck(operand)?;
        }
        self.conditions.insert(name.to_string(), condition);
        Ok(())
    }

    pub fn add_output(&mut self, id: &str, output: Output) -> SynthResult<()> {
        if self.outputs.contains_key(id) {
            return Err(ValidationError::new(
                Rule::DuplicateId,
                id,
                format!("output '{}' is already defined in stack '{}'", id, self.name),
            )
            .into());
        }
        typecheck(&output.value)?;
        self.outputs.insert(id.to_string(), output);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // ARNs
    // -------------------------------------------------------------------------

    /// ARN expression in this stack's environment
    pub fn format_arn(&self, components: &ArnComponents) -> Expr {
        format_arn(components, &self.env)
    }

    pub fn split_arn(&self, arn: &Expr, format: ArnFormat) -> SynthResult<ArnComponents> {
        parse_arn(arn, format)
    }

    // -------------------------------------------------------------------------
    // Resolution & synthesis
    // -------------------------------------------------------------------------

    pub fn environment(&self) -> Environment<'_> {
        Environment {
            stack: &self.name,
            stack_env: &self.env,
            known: &self.known,
            tokens: &self.tokens,
            fold: self.fold,
        }
    }

    /// Resolve one expression against this stack
    pub fn resolve(&self, expr: &Expr) -> SynthResult<Expr> {
        Resolver::new(self.environment()).resolve(expr)
    }

    /// Synthesize this stack alone.
    pub fn synth(&self) -> SynthResult<Template> {
        self.synthesize().map(|s| s.template)
    }

    /// Synthesize and report the cross-stack references consumed
    pub fn synthesize(&self) -> SynthResult<Synthesized> {
        self.check_references()?;

        let mut resolver = Resolver::new(self.environment());
        let mut resources = Map::new();

        for (id, record) in &self.resources {
            let mut def = Map::new();
            def.insert("Type".into(), json!(record.resource_type));

            if !record.properties.is_empty() {
                let mut props = Map::new();
                for (key, value) in &record.properties {
                    props.insert(key.clone(), render(&resolver.resolve(value)?));
                }
                def.insert("Properties".into(), Value::Object(props));
            }
            if let Some(lc) = record.lifecycle {
                def.insert("DeletionPolicy".into(), json!(lc.deletion.as_str()));
                def.insert("UpdateReplacePolicy".into(), json!(lc.update_replace.as_str()));
            }
            if !record.depends_on.is_empty() {
                def.insert("DependsOn".into(), json!(record.depends_on));
            }
            if let Some(c) = &record.condition {
                def.insert("Condition".into(), json!(c));
            }

            debug!(stack = %self.name, logical_id = %id, "resolved resource");
            resources.insert(id.clone(), Value::Object(def));
        }

        let mut document = Map::new();
        document.insert("Resources".into(), Value::Object(resources));

        if !self.conditions.is_empty() {
            let mut conditions = Map::new();
            for (name, condition) in &self.conditions {
                let resolved = condition.try_map(&mut |e| resolver.resolve(e))?;
                conditions.insert(name.clone(), resolved.render(&render));
            }
            document.insert("Conditions".into(), Value::Object(conditions));
        }

        if !self.outputs.is_empty() {
            let mut outputs = Map::new();
            for (id, output) in &self.outputs {
                let mut def = Map::new();
                def.insert("Value".into(), render(&resolver.resolve(&output.value)?));
                if let Some(d) = &output.description {
                    def.insert("Description".into(), json!(d));
                }
                if let Some(name) = &output.export_name {
                    def.insert("Export".into(), json!({ "Name": name }));
                }
                outputs.insert(id.clone(), Value::Object(def));
            }
            document.insert("Outputs".into(), Value::Object(outputs));
        }

        let imports = resolver.into_imports();
        info!(
            stack = %self.name,
            resources = self.resources.len(),
            imports = imports.len(),
            "synthesized stack"
        );
        Ok(Synthesized {
            template: Template::new(Value::Object(document)),
            imports,
        })
    }

    /// Same-stack targets and condition names must all exist
    fn check_references(&self) -> SynthResult<()> {
        let defined = |c: &str| self.conditions.contains_key(c);

        for record in self.resources.values() {
            for dep in &record.depends_on {
                if !self.resources.contains_key(dep) {
                    return Err(dangling(dep, &record.logical_id, &self.name));
                }
            }
            if let Some(c) = &record.condition {
                if !defined(c) {
                    return Err(undefined_condition(c, &self.name));
                }
            }
            for expr in record.expressions() {
                self.check_expr(expr, &record.logical_id, &defined)?;
            }
        }

        for (name, condition) in &self.conditions {
            for dep in condition.dependencies() {
                if !defined(dep) {
                    return Err(undefined_condition(dep, &self.name));
                }
            }
            for operand in condition.operands() {
                self.check_expr(operand, name, &defined)?;
            }
        }

        for (id, output) in &self.outputs {
            self.check_expr(&output.value, id, &defined)?;
        }
        Ok(())
    }

    fn check_expr(
        &self,
        expr: &Expr,
        owner: &str,
        defined: &impl Fn(&str) -> bool,
    ) -> SynthResult<()> {
        let mut exprs = vec![expr];
        for (t, recipe) in self.reachable_recipes(expr) {
            match recipe {
                Some(r) => exprs.push(r),
                None => {
                    self.tokens.recipe(t)?;
                }
            }
        }
        for e in exprs {
            for target in e.references() {
                if target.stack == self.name && !self.resources.contains_key(&target.logical_id) {
                    return Err(dangling(&target.logical_id, owner, &self.name));
                }
            }
            if let Some(err) = undefined_conditions(e, defined) {
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Address of a resource of this stack by logical id
    pub fn target(&self, logical_id: &str) -> LogicalRef {
        LogicalRef::new(&self.name, logical_id)
    }
}

fn foreign_handle(handle: &ResourceHandle, stack: &str) -> SynthError {
    ValidationError::new(
        Rule::UnknownTarget,
        handle.logical_id.clone(),
        format!(
            "resource '{}' belongs to stack '{}', not '{}'",
            handle.logical_id, handle.stack, stack
        ),
    )
    .into()
}

fn unknown_resource(logical_id: &str, stack: &str) -> SynthError {
    ValidationError::new(
        Rule::UnknownTarget,
        logical_id,
        format!("resource '{}' does not exist in stack '{}'", logical_id, stack),
    )
    .into()
}

fn dangling(target: &str, owner: &str, stack: &str) -> SynthError {
    ValidationError::new(
        Rule::UnknownTarget,
        target,
        format!(
            "'{}' references '{}', which does not exist in stack '{}'",
            owner, target, stack
        ),
    )
    .into()
}

fn undefined_condition(name: &str, stack: &str) -> SynthError {
    ValidationError::new(
        Rule::UnknownCondition,
        name,
        format!("condition '{}' is not defined in stack '{}'", name, stack),
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::DeletionPolicy;
    use pretty_assertions::assert_eq;

    fn queue(stack: &mut Stack, id: &str) -> ResourceHandle {
        stack
            .add_resource::<&str, _>(&[id, "Resource"], "AWS::SQS::Queue", [])
            .unwrap()
    }

    #[test]
    fn test_add_resource_emits_type_and_properties() {
        let mut stack = Stack::new("Test");
        let q = queue(&mut stack, "Queue");
        stack
            .add_resource(
                &["Topic"],
                "AWS::SNS::Topic",
                [("DisplayName", Expr::concat(vec!["q-".into(), q.reference()]))],
            )
            .unwrap();

        let t = stack.synth().unwrap();
        assert_eq!(
            t.resource("Topic"),
            Some(&json!({
                "Type": "AWS::SNS::Topic",
                "Properties": {"DisplayName": {"Fn::Join": ["", ["q-", {"Ref": q.logical_id}]]}}
            }))
        );
        // no properties, no lifecycle: only the type
        assert_eq!(
            t.resource(&q.logical_id),
            Some(&json!({"Type": "AWS::SQS::Queue"}))
        );
    }

    #[test]
    fn test_duplicate_path_rejected_and_stack_untouched() {
        let mut stack = Stack::new("Test");
        queue(&mut stack, "Queue");
        let err = stack
            .add_resource::<&str, _>(&["Queue", "Resource"], "AWS::SQS::Queue", [])
            .unwrap_err();
        assert_eq!(err.rule(), Some(Rule::DuplicateId));
        assert_eq!(stack.resources().count(), 1);
    }

    #[test]
    fn test_type_mismatch_raised_at_add() {
        let mut stack = Stack::new("Test");
        let err = stack
            .add_resource(
                &["Topic"],
                "AWS::SNS::Topic",
                [("DisplayName", Expr::join("-", vec!["a".into(), Expr::from(1i64)]))],
            )
            .unwrap_err();
        assert!(matches!(err, SynthError::TypeMismatch { .. }));
        assert_eq!(stack.resources().count(), 0);
    }

    #[test]
    fn test_reference_cycle_raised_at_set_property() {
        let mut stack = Stack::new("Test");
        let a = queue(&mut stack, "A");
        let b = stack
            .add_resource(&["B"], "AWS::SNS::Topic", [("Q", a.reference())])
            .unwrap();

        let err = stack.set_property(&a, "Policy", b.attribute("Arn")).unwrap_err();
        match err {
            SynthError::CyclicReference { path } => {
                assert_eq!(path.first(), Some(&a.logical_id));
                assert_eq!(path.last(), Some(&a.logical_id));
            }
            other => panic!("Expected cycle, got {:?}", other),
        }
        assert!(stack.record(&a.logical_id).unwrap().properties.is_empty());
    }

    #[test]
    fn test_explicit_dependency_sorted_and_cycle_checked() {
        let mut stack = Stack::new("Test");
        let a = queue(&mut stack, "A");
        let b = queue(&mut stack, "B");
        let c = queue(&mut stack, "C");
        stack.add_dependency(&a, &c).unwrap();
        stack.add_dependency(&a, &b).unwrap();
        assert!(stack.add_dependency(&c, &a).is_err());
        assert!(stack.add_dependency(&a, &a).is_err());

        let t = stack.synth().unwrap();
        let mut expected = vec![b.logical_id.clone(), c.logical_id.clone()];
        expected.sort();
        assert_eq!(t.resource(&a.logical_id).unwrap()["DependsOn"], json!(expected));
    }

    #[test]
    fn test_removal_policy_emitted_only_when_applied() {
        let mut stack = Stack::new("Test");
        let a = queue(&mut stack, "A");
        let b = queue(&mut stack, "B");
        stack.apply_removal_policy(&a, None).unwrap();
        stack
            .apply_removal_policy(&b, Some(RemovalPolicy::Retain))
            .unwrap();
        assert_eq!(
            stack.record(&b.logical_id).unwrap().lifecycle.map(|l| l.deletion),
            Some(DeletionPolicy::Retain)
        );

        let t = stack.synth().unwrap();
        assert_eq!(t.resource(&a.logical_id).unwrap()["DeletionPolicy"], "Delete");
        assert_eq!(t.resource(&b.logical_id).unwrap()["UpdateReplacePolicy"], "Retain");
        let untouched = queue(&mut stack, "C");
        let t = stack.synth().unwrap();
        assert!(t.resource(&untouched.logical_id).unwrap().get("DeletionPolicy").is_none());
    }

    #[test]
    fn test_dangling_reference_fails_synth() {
        let mut stack = Stack::new("Test");
        stack
            .add_resource(
                &["Topic"],
                "AWS::SNS::Topic",
                [("Q", Expr::reference(stack.target("Missing")))],
            )
            .unwrap();
        let err = stack.synth().unwrap_err();
        assert_eq!(err.rule(), Some(Rule::UnknownTarget));
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_conditions_rendered_and_checked() {
        let mut stack = Stack::new("Test");
        stack
            .add_condition(
                "IsProd",
                ConditionExpr::equals(Expr::pseudo(crate::expr::Pseudo::Region), "us-east-1"),
            )
            .unwrap();
        let q = queue(&mut stack, "Q");
        stack.set_resource_condition(&q, "IsProd").unwrap();
        stack
            .set_property(&q, "Name", Expr::conditional("IsProd", "p".into(), "d".into()))
            .unwrap();

        let t = stack.synth().unwrap();
        assert_eq!(
            t.as_value()["Conditions"]["IsProd"],
            json!({"Fn::Equals": [{"Ref": "AWS::Region"}, "us-east-1"]})
        );
        assert_eq!(t.resource(&q.logical_id).unwrap()["Condition"], "IsProd");

        stack
            .set_property(&q, "Other", Expr::conditional("Nope", "p".into(), "d".into()))
            .unwrap();
        assert_eq!(stack.synth().unwrap_err().rule(), Some(Rule::UnknownCondition));
    }

    #[test]
    fn test_singleton_factory_runs_once() {
        let mut stack = Stack::new("Test");
        let first = stack
            .singleton("Shared", |s| Ok(queue(s, "Shared")))
            .unwrap();
        let second = stack
            .singleton("Shared", |_| panic!("factory must not run twice"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(stack.resources().count(), 1);
    }

    #[test]
    fn test_placeholder_dependency_tracked() {
        let mut stack = Stack::new("Test");
        let a = queue(&mut stack, "A");
        let p = stack.placeholder(Some("arn"), a.attribute("Arn")).unwrap();
        let b = stack
            .add_resource(&["B"], "AWS::SNS::Topic", [("Source", p)])
            .unwrap();
        assert!(stack.set_property(&a, "Back", b.reference()).is_err());

        let t = stack.synth().unwrap();
        assert_eq!(
            t.resource("B").unwrap()["Properties"]["Source"],
            json!({"Fn::GetAtt": [a.logical_id, "Arn"]})
        );
    }

    #[test]
    fn test_late_bind_closing_cycle_rejected() {
        let mut stack = Stack::new("Test");
        let t = stack.declare_placeholder(Some("late"));
        let a = stack
            .add_resource(&["A"], "AWS::SNS::Topic", [("X", Expr::token(t))])
            .unwrap();
        let b = stack
            .add_resource(&["B"], "AWS::SNS::Topic", [("Y", a.reference())])
            .unwrap();

        let err = stack.bind_placeholder(t, b.reference()).unwrap_err();
        assert!(
            matches!(err, SynthError::CyclicReference { .. }),
            "Expected cycle, got {:?}",
            err
        );
        // the binding was undone, so the placeholder is still open
        assert_eq!(stack.synth().unwrap_err().rule(), Some(Rule::Unbound));

        stack.bind_placeholder(t, "plain".into()).unwrap();
        let template = stack.synth().unwrap();
        assert_eq!(template.resource("A").unwrap()["Properties"]["X"], "plain");
    }

    #[test]
    fn test_late_bind_through_nested_placeholder_tracks_dependency() {
        let mut stack = Stack::new("Test");
        let inner = stack.declare_placeholder(Some("inner"));
        let outer = stack.placeholder(Some("outer"), Expr::token(inner)).unwrap();
        let a = stack
            .add_resource(&["A"], "AWS::SNS::Topic", [("X", outer)])
            .unwrap();
        let b = stack
            .add_resource(&["B"], "AWS::SNS::Topic", [("Y", a.reference())])
            .unwrap();

        assert!(stack.bind_placeholder(inner, b.reference()).is_err());

        let c = queue(&mut stack, "C");
        stack.bind_placeholder(inner, c.reference()).unwrap();
        assert!(stack.set_property(&c, "Back", a.reference()).is_err());
    }

    #[test]
    fn test_dangling_ref_behind_two_placeholders_fails_synth() {
        let mut stack = Stack::new("Test");
        let missing = Expr::reference(stack.target("Missing"));
        let inner = stack.placeholder(Some("inner"), missing).unwrap();
        let outer = stack.placeholder(Some("outer"), inner).unwrap();
        stack
            .add_resource(&["A"], "AWS::SNS::Topic", [("X", outer)])
            .unwrap();

        let err = stack.synth().unwrap_err();
        assert_eq!(err.rule(), Some(Rule::UnknownTarget));
        assert!(err.to_string().contains("Missing"), "{}", err);
    }

    #[test]
    fn test_unbound_placeholder_fails_synth() {
        let mut stack = Stack::new("Test");
        let id = stack.declare_placeholder(Some("later"));
        stack
            .add_resource(&["B"], "AWS::SNS::Topic", [("X", Expr::token(id))])
            .unwrap();
        assert_eq!(stack.synth().unwrap_err().rule(), Some(Rule::Unbound));
        stack.bind_placeholder(id, "now".into()).unwrap();
        assert_eq!(stack.synth().unwrap().resource("B").unwrap()["Properties"]["X"], "now");
    }

    #[test]
    fn test_outputs_with_export() {
        let mut stack = Stack::new("Test");
        let q = queue(&mut stack, "Q");
        stack
            .add_output(
                "QueueArn",
                Output {
                    value: q.attribute("Arn"),
                    export_name: Some("Test:QueueArn".into()),
                    description: None,
                },
            )
            .unwrap();
        let t = stack.synth().unwrap();
        assert_eq!(
            t.output("QueueArn"),
            Some(&json!({"Value": {"Fn::GetAtt": [q.logical_id, "Arn"]}, "Export": {"Name": "Test:QueueArn"}}))
        );
    }

    #[test]
    fn test_synth_is_deterministic() {
        let build = || {
            let mut stack = Stack::new("Test");
            let a = queue(&mut stack, "A");
            stack
                .add_resource(&["B", "Resource"], "AWS::SNS::Topic", [("Q", a.attribute("Arn"))])
                .unwrap();
            stack.synth().unwrap().to_pretty_json()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut a = Stack::new("A");
        let mut b = Stack::new("B");
        let q = queue(&mut a, "Q");
        let err = b.apply_removal_policy(&q, None).unwrap_err();
        assert_eq!(err.rule(), Some(Rule::UnknownTarget));
        assert!(queue(&mut b, "Q").stack == "B");
    }
}
