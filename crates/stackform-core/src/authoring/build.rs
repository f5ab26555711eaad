//! Compile an [`AppDto`] into an [`App`]
//!
//! Expression syntax inside properties, conditions, outputs and placeholder
//! recipes:
//! - scalars, sequences and multi-key maps are literals
//! - a single-key map whose key is an intrinsic (`Ref`, `GetAtt`, `Join`,
//!   `Split`, `Select`, `If`, `Pseudo`, `Arn`, `ArnPart`, `Str`,
//!   `Placeholder`, optionally prefixed with `Fn::`) is that intrinsic
//! - the YAML short form `!Ref Bus` is accepted as well
//!
//! `Ref: Other/Bus` targets resource `Bus` of stack `Other`; `Ref: AWS::Region`
//! is a pseudo parameter.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Context, Result};
use serde_yaml::Value;
use tracing::debug;

use super::dto::{AppDto, OutputDto, StackDto};
use super::yaml::parse_app_yaml;
use crate::app::App;
use crate::arn::{format_arn, parse_arn, ArnComponents, ArnFormat};
use crate::conditions::ConditionExpr;
use crate::env::StackEnv;
use crate::expr::{Expr, LogicalRef, Pseudo};
use crate::lifecycle::RemovalPolicy;
use crate::naming::unique_id;
use crate::resource::ResourceHandle;
use crate::stack::{Output, Stack};
use crate::token::TokenId;

/// Resource id → logical id, per stack
type IdTable = BTreeMap<String, BTreeMap<String, String>>;

pub fn compile_from_yaml(yaml_str: &str) -> Result<App> {
    let dto = parse_app_yaml(yaml_str).context("invalid app document")?;
    compile_app(&dto)
}

pub fn compile_app(dto: &AppDto) -> Result<App> {
    let mut ids = IdTable::new();
    for stack in &dto.stacks {
        let table = logical_ids(stack).with_context(|| format!("stack '{}'", stack.name))?;
        ids.insert(stack.name.clone(), table);
    }

    let mut app = App::new();
    for stack in &dto.stacks {
        let compiled = compile_stack(stack, &ids).with_context(|| format!("stack '{}'", stack.name))?;
        app.add_stack(compiled)?;
    }
    app.set_fold(dto.settings.fold);

    debug!(stacks = dto.stacks.len(), fold = dto.settings.fold, "compiled app");
    Ok(app)
}

/// Logical id of every resource id; singleton aliases share the first id
fn logical_ids(stack: &StackDto) -> Result<BTreeMap<String, String>> {
    let mut table = BTreeMap::new();
    let mut by_key: HashMap<&str, String> = HashMap::new();

    for r in &stack.resources {
        let own = unique_id(&[r.id.as_str()])?;
        let logical_id = match &r.singleton {
            Some(key) => by_key.entry(key.as_str()).or_insert(own).clone(),
            None => own,
        };
        if table.insert(r.id.clone(), logical_id).is_some() {
            bail!("resource id '{}' is used more than once", r.id);
        }
    }
    Ok(table)
}

fn compile_stack(dto: &StackDto, ids: &IdTable) -> Result<Stack> {
    let mut stack = Stack::with_env(dto.name.as_str(), dto.env.clone());

    // Declare first so recipes may use each other in any order
    let mut placeholders = BTreeMap::new();
    for name in dto.placeholders.keys() {
        placeholders.insert(name.clone(), stack.declare_placeholder(Some(name)));
    }

    let scope = Scope {
        stack: &dto.name,
        env: &dto.env,
        ids,
        placeholders: &placeholders,
    };

    for (name, recipe) in &dto.placeholders {
        let expr = scope
            .expr(recipe)
            .with_context(|| format!("placeholder '{}'", name))?;
        stack.bind_placeholder(placeholders[name], expr)?;
    }

    for (name, condition) in &dto.conditions {
        let condition = scope
            .condition(condition)
            .with_context(|| format!("condition '{}'", name))?;
        stack.add_condition(name, condition)?;
    }

    let mut handles: BTreeMap<&str, ResourceHandle> = BTreeMap::new();
    for r in &dto.resources {
        let properties = r
            .properties
            .iter()
            .map(|(k, v)| {
                let e = scope.expr(v).with_context(|| format!("property '{}'", k))?;
                Ok((k.clone(), e))
            })
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("resource '{}'", r.id))?;

        let path = [r.id.as_str()];
        let (handle, created) = match &r.singleton {
            Some(key) => {
                let created = !stack.has_singleton(key);
                let handle = stack.singleton(key, |s| {
                    s.add_resource(&path, &r.resource_type, properties)
                })?;
                (handle, created)
            }
            None => (stack.add_resource(&path, &r.resource_type, properties)?, true),
        };

        if created {
            if let Some(policy) = &r.removal_policy {
                let policy: RemovalPolicy = policy.parse()?;
                stack
                    .apply_removal_policy(&handle, Some(policy))
                    .with_context(|| format!("resource '{}'", r.id))?;
            }
            if let Some(condition) = &r.condition {
                stack.set_resource_condition(&handle, condition)?;
            }
        }
        handles.insert(r.id.as_str(), handle);
    }

    for r in &dto.resources {
        for dep in &r.depends_on {
            let (Some(dependent), Some(dependency)) =
                (handles.get(r.id.as_str()), handles.get(dep.as_str()))
            else {
                bail!("resource '{}' depends on unknown resource '{}'", r.id, dep);
            };
            stack.add_dependency(dependent, dependency)?;
        }
    }

    for (id, output) in &dto.outputs {
        let value = scope
            .expr(output.value())
            .with_context(|| format!("output '{}'", id))?;
        let (export_name, description) = match output {
            OutputDto::Detailed {
                export_name,
                description,
                ..
            } => (export_name.clone(), description.clone()),
            OutputDto::Bare(_) => (None, None),
        };
        stack.add_output(
            id,
            Output {
                value,
                export_name,
                description,
            },
        )?;
    }

    Ok(stack)
}

// ── Expressions ──

struct Scope<'a> {
    stack: &'a str,
    env: &'a StackEnv,
    ids: &'a IdTable,
    placeholders: &'a BTreeMap<String, TokenId>,
}

impl Scope<'_> {
    fn expr(&self, value: &Value) -> Result<Expr> {
        match value {
            Value::Null => Ok(Expr::null()),
            Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Ok(Expr::literal(serde_json::to_value(value)?))
            }
            Value::Sequence(items) => Ok(Expr::list(
                items.iter().map(|i| self.expr(i)).collect::<Result<_>>()?,
            )),
            Value::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                self.intrinsic(tag.trim_start_matches('!'), &tagged.value)
            }
            Value::Mapping(map) => {
                if map.len() == 1 {
                    if let Some((Value::String(key), arg)) = map.iter().next() {
                        let name = key.strip_prefix("Fn::").unwrap_or(key);
                        if is_intrinsic(name) {
                            return self.intrinsic(name, arg);
                        }
                    }
                }
                let mut entries = BTreeMap::new();
                for (k, v) in map {
                    let key = k
                        .as_str()
                        .ok_or_else(|| anyhow!("map keys must be strings, found {:?}", k))?;
                    entries.insert(key.to_string(), self.expr(v)?);
                }
                Ok(Expr::Map(entries))
            }
        }
    }

    fn intrinsic(&self, name: &str, arg: &Value) -> Result<Expr> {
        match name {
            "Ref" => {
                let target = string_arg(name, arg)?;
                if target.starts_with("AWS::") {
                    return Ok(Expr::pseudo(target.parse()?));
                }
                Ok(Expr::reference(self.target(target)))
            }
            "GetAtt" => {
                let (id, attribute) = match arg {
                    Value::String(s) => s
                        .split_once('.')
                        .ok_or_else(|| anyhow!("GetAtt expects 'Resource.Attribute', found '{}'", s))?,
                    _ => {
                        let [id, attribute] = args::<2>(name, arg)?;
                        (string_arg(name, id)?, string_arg(name, attribute)?)
                    }
                };
                Ok(Expr::get_att(self.target(id), attribute))
            }
            "Join" => {
                let [delimiter, parts] = args::<2>(name, arg)?;
                let Value::Sequence(parts) = parts else {
                    bail!("Join expects [delimiter, [parts...]]");
                };
                Ok(Expr::join(
                    self.expr(delimiter)?,
                    parts.iter().map(|p| self.expr(p)).collect::<Result<_>>()?,
                ))
            }
            "Split" => {
                let [delimiter, source] = args::<2>(name, arg)?;
                Ok(Expr::split(self.expr(delimiter)?, self.expr(source)?))
            }
            "Select" => {
                let [index, source] = args::<2>(name, arg)?;
                let index = index
                    .as_u64()
                    .ok_or_else(|| anyhow!("Select index must be a non-negative integer"))?;
                Ok(Expr::select(usize::try_from(index)?, self.expr(source)?))
            }
            "If" => {
                let [condition, if_true, if_false] = args::<3>(name, arg)?;
                Ok(Expr::conditional(
                    string_arg(name, condition)?,
                    self.expr(if_true)?,
                    self.expr(if_false)?,
                ))
            }
            "Pseudo" => {
                let p: Pseudo = string_arg(name, arg)?.parse()?;
                Ok(Expr::pseudo(p))
            }
            "Arn" => Ok(format_arn(&self.arn_components(arg)?, self.env)),
            "ArnPart" => {
                let (arn, part, format) = match arg.as_sequence().map(Vec::as_slice) {
                    Some([arn, part]) => (arn, part, ArnFormat::default()),
                    Some([arn, part, format]) => (arn, part, string_arg(name, format)?.parse::<ArnFormat>()?),
                    _ => bail!("ArnPart expects [arn, part] or [arn, part, format]"),
                };
                let part = string_arg(name, part)?;
                let components = parse_arn(&self.expr(arn)?, format)?;
                components
                    .part(part)
                    .cloned()
                    .ok_or_else(|| anyhow!("ARN has no '{}' component", part))
            }
            "Str" => Ok(self.expr(arg)?.stringify()?),
            "Placeholder" => {
                let placeholder = string_arg(name, arg)?;
                self.placeholders
                    .get(placeholder)
                    .map(|id| Expr::token(*id))
                    .ok_or_else(|| anyhow!("unknown placeholder '{}'", placeholder))
            }
            other => bail!("unknown intrinsic '{}'", other),
        }
    }

    fn arn_components(&self, arg: &Value) -> Result<ArnComponents> {
        let field = |key: &str| -> Result<Option<Expr>> {
            arg.get(key).map(|v| self.expr(v)).transpose()
        };
        let service = field("service")?.ok_or_else(|| anyhow!("Arn requires 'service'"))?;
        let resource = field("resource")?.ok_or_else(|| anyhow!("Arn requires 'resource'"))?;

        let mut components = ArnComponents::new(service, resource);
        if let Some(name) = field("resource_name")? {
            components = components.resource_name(name);
        }
        if let Some(format) = arg.get("format") {
            components = components.format(string_arg("Arn", format)?.parse()?);
        }
        if let Some(p) = field("partition")? {
            components = components.partition(p);
        }
        if let Some(r) = field("region")? {
            components = components.region(r);
        }
        if let Some(a) = field("account")? {
            components = components.account(a);
        }
        Ok(components)
    }

    /// `Bus` in this stack, or `Other/Bus` in another one
    fn target(&self, path: &str) -> LogicalRef {
        let (stack, id) = path.split_once('/').unwrap_or((self.stack, path));
        let logical_id = self
            .ids
            .get(stack)
            .and_then(|t| t.get(id))
            .cloned()
            .unwrap_or_else(|| crate::naming::sanitize(id));
        LogicalRef::new(stack, logical_id)
    }

    fn condition(&self, value: &Value) -> Result<ConditionExpr> {
        let (name, arg) = match value {
            Value::Tagged(tagged) => (
                tagged.tag.to_string().trim_start_matches('!').to_string(),
                &tagged.value,
            ),
            Value::Mapping(map) if map.len() == 1 => match map.iter().next() {
                Some((Value::String(key), arg)) => {
                    (key.strip_prefix("Fn::").unwrap_or(key).to_string(), arg)
                }
                _ => bail!("condition keys must be strings"),
            },
            _ => bail!("a condition must be a single-key map such as {{ Equals: [a, b] }}"),
        };

        match name.as_str() {
            "Equals" => {
                let [a, b] = args::<2>("Equals", arg)?;
                Ok(ConditionExpr::Equals(self.expr(a)?, self.expr(b)?))
            }
            "Not" => {
                let inner = match arg.as_sequence().map(Vec::as_slice) {
                    Some([inner]) => inner,
                    _ => arg,
                };
                Ok(ConditionExpr::not(self.condition(inner)?))
            }
            "And" | "Or" => {
                let items = arg
                    .as_sequence()
                    .ok_or_else(|| anyhow!("{} expects a list of conditions", name))?
                    .iter()
                    .map(|c| self.condition(c))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if name == "And" {
                    ConditionExpr::And(items)
                } else {
                    ConditionExpr::Or(items)
                })
            }
            "Condition" => Ok(ConditionExpr::Condition(string_arg("Condition", arg)?.to_string())),
            other => bail!("unknown condition function '{}'", other),
        }
    }
}

fn is_intrinsic(name: &str) -> bool {
    matches!(
        name,
        "Ref"
            | "GetAtt"
            | "Join"
            | "Split"
            | "Select"
            | "If"
            | "Pseudo"
            | "Arn"
            | "ArnPart"
            | "Str"
            | "Placeholder"
    )
}

fn args<'v, const N: usize>(name: &str, arg: &'v Value) -> Result<[&'v Value; N]> {
    let items = arg
        .as_sequence()
        .ok_or_else(|| anyhow!("{} expects a list of {} arguments", name, N))?;
    let refs: Vec<&Value> = items.iter().collect();
    refs.try_into()
        .map_err(|v: Vec<&Value>| anyhow!("{} expects {} arguments, found {}", name, N, v.len()))
}

fn string_arg<'v>(name: &str, arg: &'v Value) -> Result<&'v str> {
    arg.as_str()
        .ok_or_else(|| anyhow!("{} expects a string argument, found {:?}", name, arg))
}
