//! ARN construction and decomposition over deferred values
//!
//! `format_arn` builds `arn:<partition>:<service>:<region>:<account>:<last>`
//! as a `Join` tree. `parse_arn` goes the other way: when the ARN is a
//! literal, or a `Join` whose literal text carries the five `:` separators,
//! segments are cut positionally and stay literal where they are literal.
//! Anything else is decomposed with `Select`/`Split` trees that are resolved
//! at deploy time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::env::{ResourceEnvironment, StackEnv};
use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::expr::Expr;

/// Number of `:`-separated segments every ARN has at least
const MIN_SEGMENTS: usize = 6;

// ── Format ──────────────────────────────────────────────────────

/// How the resource name is attached to the resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArnFormat {
    /// `arn:aws:sqs:us-east-1:123456789012:queue`
    #[default]
    NoResourceName,
    /// `arn:aws:events:us-east-1:123456789012:event-bus/name`
    SlashResourceName,
    /// `arn:aws:lambda:us-east-1:123456789012:function:name`
    ColonResourceName,
}

impl ArnFormat {
    fn separator(&self) -> &'static str {
        match self {
            ArnFormat::ColonResourceName => ":",
            _ => "/",
        }
    }
}

impl FromStr for ArnFormat {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "no_resource_name" => Ok(ArnFormat::NoResourceName),
            "slash" | "slash_resource_name" => Ok(ArnFormat::SlashResourceName),
            "colon" | "colon_resource_name" => Ok(ArnFormat::ColonResourceName),
            _ => Err(ValidationError::new(
                Rule::Unsupported,
                s,
                format!("unknown ARN format '{}' (expected none, slash or colon)", s),
            )
            .into()),
        }
    }
}

impl fmt::Display for ArnFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArnFormat::NoResourceName => "none",
            ArnFormat::SlashResourceName => "slash",
            ArnFormat::ColonResourceName => "colon",
        })
    }
}

// ── Components ──────────────────────────────────────────────────

/// Typed pieces of an ARN, each possibly deferred.
///
/// `partition`, `region` and `account` default to the stack environment
/// when formatting. Parsing always fills them in.
#[derive(Debug, Clone, PartialEq)]
pub struct ArnComponents {
    pub partition: Option<Expr>,
    pub service: Expr,
    pub region: Option<Expr>,
    pub account: Option<Expr>,
    pub resource: Expr,
    pub resource_name: Option<Expr>,
    pub format: ArnFormat,
}

impl ArnComponents {
    pub fn new(service: impl Into<Expr>, resource: impl Into<Expr>) -> Self {
        Self {
            partition: None,
            service: service.into(),
            region: None,
            account: None,
            resource: resource.into(),
            resource_name: None,
            format: ArnFormat::NoResourceName,
        }
    }

    /// Attach a resource name; slash-separated unless a format is set later
    pub fn resource_name(mut self, name: impl Into<Expr>) -> Self {
        self.resource_name = Some(name.into());
        if self.format == ArnFormat::NoResourceName {
            self.format = ArnFormat::SlashResourceName;
        }
        self
    }

    pub fn format(mut self, format: ArnFormat) -> Self {
        self.format = format;
        self
    }

    pub fn partition(mut self, partition: impl Into<Expr>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn region(mut self, region: impl Into<Expr>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn account(mut self, account: impl Into<Expr>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Account/region of the ARN, falling back to the stack's own
    pub fn environment(&self, stack: &StackEnv) -> ResourceEnvironment {
        ResourceEnvironment {
            account: self
                .account
                .clone()
                .unwrap_or_else(|| stack.account_expr()),
            region: self.region.clone().unwrap_or_else(|| stack.region_expr()),
        }
    }

    /// Look a component up by its field name (`resourceName` or `resource_name`)
    pub fn part(&self, name: &str) -> Option<&Expr> {
        match name {
            "partition" => self.partition.as_ref(),
            "service" => Some(&self.service),
            "region" => self.region.as_ref(),
            "account" => self.account.as_ref(),
            "resource" => Some(&self.resource),
            "resourceName" | "resource_name" => self.resource_name.as_ref(),
            _ => None,
        }
    }
}

// ── Formatting ──────────────────────────────────────────────────

/// Build the ARN expression for `components` inside a stack environment.
pub fn format_arn(components: &ArnComponents, stack: &StackEnv) -> Expr {
    let partition = components
        .partition
        .clone()
        .unwrap_or_else(|| stack.partition_expr());
    let region = components
        .region
        .clone()
        .unwrap_or_else(|| stack.region_expr());
    let account = components
        .account
        .clone()
        .unwrap_or_else(|| stack.account_expr());

    let last = match &components.resource_name {
        None => components.resource.clone(),
        Some(name) => Expr::join(
            components.format.separator(),
            vec![components.resource.clone(), name.clone()],
        ),
    };

    Expr::join(
        ":",
        vec![
            Expr::string("arn"),
            partition,
            components.service.clone(),
            region,
            account,
            last,
        ],
    )
}

// ── Parsing ─────────────────────────────────────────────────────

/// Piece of an ARN string: known text or an opaque deferred value
#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Text(String),
    Deferred(Expr),
}

type Segment = Vec<Fragment>;

/// Decompose an ARN expression into its components.
pub fn parse_arn(arn: &Expr, format: ArnFormat) -> SynthResult<ArnComponents> {
    if let Some(text) = arn.as_str() {
        return parse_literal(text, format);
    }

    match fragments(arn) {
        Some(frags) => {
            let segments = split_segments(&frags, ':');
            if segments.len() >= MIN_SEGMENTS {
                if let Some(prefix) = literal_text(&segments[0]) {
                    if prefix != "arn" {
                        return Err(invalid_arn(&render_fragments(&frags)));
                    }
                }
                from_segments(segments, format, &render_fragments(&frags))
            } else {
                Ok(select_tree(arn, format))
            }
        }
        None => Ok(select_tree(arn, format)),
    }
}

fn parse_literal(text: &str, format: ArnFormat) -> SynthResult<ArnComponents> {
    let segments: Vec<Segment> = text
        .split(':')
        .map(|s| vec![Fragment::Text(s.to_string())])
        .collect();
    if segments.len() < MIN_SEGMENTS || !text.starts_with("arn:") {
        return Err(invalid_arn(text));
    }
    from_segments(segments, format, text)
}

fn invalid_arn(text: &str) -> SynthError {
    ValidationError::new(
        Rule::InvalidArn,
        text,
        format!(
            "ARNs must start with \"arn:\" and have at least 6 components: {}",
            text
        ),
    )
    .into()
}

/// Flatten literals and literal-delimited joins into text/deferred pieces
fn fragments(expr: &Expr) -> Option<Vec<Fragment>> {
    let mut out = Vec::new();
    if !collect_fragments(expr, &mut out) {
        return None;
    }
    Some(merge_text(out))
}

fn collect_fragments(expr: &Expr, out: &mut Vec<Fragment>) -> bool {
    match expr {
        Expr::Literal(Value::String(s)) => {
            out.push(Fragment::Text(s.clone()));
            true
        }
        Expr::Join { delimiter, parts } => {
            let Some(delim) = delimiter.as_str() else {
                return false;
            };
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(Fragment::Text(delim.to_string()));
                }
                if !collect_fragments(part, out) {
                    out.push(Fragment::Deferred(part.clone()));
                }
            }
            true
        }
        _ => false,
    }
}

fn merge_text(frags: Vec<Fragment>) -> Vec<Fragment> {
    let mut merged: Vec<Fragment> = Vec::with_capacity(frags.len());
    for f in frags {
        match (merged.last_mut(), f) {
            (Some(Fragment::Text(prev)), Fragment::Text(next)) => prev.push_str(&next),
            (_, Fragment::Text(next)) if next.is_empty() => {}
            (_, f) => merged.push(f),
        }
    }
    merged
}

/// Cut fragments at every occurrence of `sep` inside text pieces
fn split_segments(frags: &[Fragment], sep: char) -> Vec<Segment> {
    let mut segments = vec![Vec::new()];
    for f in frags {
        match f {
            Fragment::Deferred(_) => {
                if let Some(current) = segments.last_mut() {
                    current.push(f.clone());
                }
            }
            Fragment::Text(text) => {
                for (i, piece) in text.split(sep).enumerate() {
                    if i > 0 {
                        segments.push(Vec::new());
                    }
                    if !piece.is_empty() {
                        if let Some(current) = segments.last_mut() {
                            current.push(Fragment::Text(piece.to_string()));
                        }
                    }
                }
            }
        }
    }
    segments
}

/// Cut a segment at the first occurrence of `sep` in its text
fn split_once_segment(segment: &[Fragment], sep: char) -> Option<(Segment, Segment)> {
    for (i, f) in segment.iter().enumerate() {
        if let Fragment::Text(text) = f {
            if let Some((before, after)) = text.split_once(sep) {
                let mut head: Segment = segment[..i].to_vec();
                if !before.is_empty() {
                    head.push(Fragment::Text(before.to_string()));
                }
                let mut tail: Segment = Vec::new();
                if !after.is_empty() {
                    tail.push(Fragment::Text(after.to_string()));
                }
                tail.extend(segment[i + 1..].iter().cloned());
                return Some((head, tail));
            }
        }
    }
    None
}

fn literal_text(segment: &[Fragment]) -> Option<String> {
    let mut out = String::new();
    for f in segment {
        match f {
            Fragment::Text(t) => out.push_str(t),
            Fragment::Deferred(_) => return None,
        }
    }
    Some(out)
}

fn segment_expr(segment: Segment) -> Expr {
    if let Some(text) = literal_text(&segment) {
        return Expr::string(text);
    }
    let mut parts: Vec<Expr> = segment
        .into_iter()
        .map(|f| match f {
            Fragment::Text(t) => Expr::string(t),
            Fragment::Deferred(e) => e,
        })
        .collect();
    if parts.len() == 1 {
        return parts.remove(0);
    }
    Expr::concat(parts)
}

fn has_separator(segment: &[Fragment], sep: char) -> bool {
    segment
        .iter()
        .any(|f| matches!(f, Fragment::Text(t) if t.contains(sep)))
}

/// Components are cut positionally, the same way the `Select`/`Split` tree
/// addresses them. Extra separators would be dropped by that tree, so they
/// are rejected here.
fn from_segments(
    mut segments: Vec<Segment>,
    format: ArnFormat,
    shown: &str,
) -> SynthResult<ArnComponents> {
    let addressable = match format {
        ArnFormat::ColonResourceName => MIN_SEGMENTS + 1,
        _ => MIN_SEGMENTS,
    };
    if segments.len() > addressable {
        return Err(unaddressable(shown, format, ':'));
    }

    let mut rest = segments.split_off(5).into_iter();
    let last = rest.next().unwrap_or_default();
    let mut head = segments.into_iter().map(segment_expr);
    // segment 0 is the literal "arn" prefix
    let _prefix = head.next();
    let partition = head.next();
    let service = head.next().unwrap_or_else(Expr::null);
    let region = head.next();
    let account = head.next();

    let (resource, resource_name) = match format {
        ArnFormat::NoResourceName => (segment_expr(last), None),
        ArnFormat::ColonResourceName => (segment_expr(last), rest.next().map(segment_expr)),
        ArnFormat::SlashResourceName => match split_once_segment(&last, '/') {
            Some((_, name)) if has_separator(&name, '/') => {
                return Err(unaddressable(shown, format, '/'));
            }
            Some((resource, name)) => (segment_expr(resource), Some(segment_expr(name))),
            None => (segment_expr(last), None),
        },
    };

    Ok(ArnComponents {
        partition,
        service,
        region,
        account,
        resource,
        resource_name,
        format,
    })
}

fn unaddressable(shown: &str, format: ArnFormat, sep: char) -> SynthError {
    ValidationError::new(
        Rule::InvalidArn,
        shown,
        format!(
            "ARN {} has more '{}' separators than the {} format addresses; parse it with a format that keeps the tail in one component",
            shown, sep, format
        ),
    )
    .into()
}

/// Deploy-time decomposition: `Select(i, Split(":", arn))`
fn select_tree(arn: &Expr, format: ArnFormat) -> ArnComponents {
    let segment = |i: usize| Expr::select(i, Expr::split(":", arn.clone()));

    let (resource, resource_name) = match format {
        ArnFormat::NoResourceName => (segment(5), None),
        ArnFormat::ColonResourceName => (segment(5), Some(segment(6))),
        ArnFormat::SlashResourceName => {
            let last = || Expr::split("/", segment(5));
            (Expr::select(0, last()), Some(Expr::select(1, last())))
        }
    };

    ArnComponents {
        partition: Some(segment(1)),
        service: segment(2),
        region: Some(segment(3)),
        account: Some(segment(4)),
        resource,
        resource_name,
        format,
    }
}

fn render_fragments(frags: &[Fragment]) -> String {
    frags
        .iter()
        .map(|f| match f {
            Fragment::Text(t) => t.clone(),
            Fragment::Deferred(e) => format!("${{{}}}", e.kind()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{LogicalRef, Pseudo};
    use crate::resolve::{render, resolve, Environment, KnownValues};
    use crate::token::TokenTable;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fold(e: &Expr) -> Expr {
        let stack_env = StackEnv::agnostic();
        let known = KnownValues::new();
        let tokens = TokenTable::new();
        resolve(
            e,
            Environment {
                stack: "Stack",
                stack_env: &stack_env,
                known: &known,
                tokens: &tokens,
                fold: true,
            },
        )
        .unwrap()
    }

    fn bus() -> LogicalRef {
        LogicalRef::new("Stack", "BusEA82B648")
    }

    #[test]
    fn test_format_defaults_to_stack_env() {
        let arn = format_arn(
            &ArnComponents::new("events", "event-bus").resource_name("my-bus"),
            &StackEnv::agnostic(),
        );
        assert_eq!(
            render(&fold(&arn)),
            json!({"Fn::Join": [":", [
                "arn",
                {"Ref": "AWS::Partition"},
                "events",
                {"Ref": "AWS::Region"},
                {"Ref": "AWS::AccountId"},
                "event-bus/my-bus"
            ]]})
        );
    }

    #[test]
    fn test_format_pinned_env_folds_to_literal() {
        let env = StackEnv::pinned("123456789012", "us-east-1").with_partition("aws");
        let arn = format_arn(
            &ArnComponents::new("lambda", "function")
                .resource_name("handler")
                .format(ArnFormat::ColonResourceName),
            &env,
        );
        assert_eq!(
            fold(&arn),
            Expr::string("arn:aws:lambda:us-east-1:123456789012:function:handler")
        );
    }

    #[test]
    fn test_literal_round_trip_all_formats() {
        let cases = [
            ("arn:aws:sqs:us-east-1:123456789012:queue", ArnFormat::NoResourceName),
            (
                "arn:aws:events:us-west-1:myAccount:event-bus/myEventBus",
                ArnFormat::SlashResourceName,
            ),
            (
                "arn:aws:lambda:eu-west-1:123456789012:function:my-alias",
                ArnFormat::ColonResourceName,
            ),
        ];
        for (text, format) in cases {
            let parsed = parse_arn(&Expr::string(text), format).unwrap();
            let formatted = format_arn(&parsed, &StackEnv::agnostic());
            assert_eq!(fold(&formatted), Expr::string(text), "{}", text);
        }
    }

    #[test]
    fn test_nested_path_kept_whole_without_resource_name() {
        let parsed = parse_arn(
            &Expr::string("arn:aws:s3:::bucket/a/b/c"),
            ArnFormat::NoResourceName,
        )
        .unwrap();
        assert_eq!(parsed.region, Some(Expr::string("")));
        assert_eq!(parsed.resource, Expr::string("bucket/a/b/c"));
        assert_eq!(parsed.resource_name, None);
    }

    #[test]
    fn test_extra_separators_rejected() {
        let cases = [
            ("arn:aws:s3:::bucket/a/b/c", ArnFormat::SlashResourceName),
            ("arn:aws:lambda:eu-west-1:1:function:my:alias", ArnFormat::ColonResourceName),
            ("arn:aws:logs:eu-west-1:1:log-group:name", ArnFormat::NoResourceName),
        ];
        for (text, format) in cases {
            let err = parse_arn(&Expr::string(text), format).unwrap_err();
            assert_eq!(err.rule(), Some(Rule::InvalidArn), "{}", text);
            assert!(err.to_string().contains("separators"), "{}", err);
        }
    }

    #[test]
    fn test_invalid_literal_arns() {
        for bad in ["arn:aws:events", "aws:events:us-east-1:1:bus/x", ""] {
            let err = parse_arn(&Expr::string(bad), ArnFormat::NoResourceName).unwrap_err();
            assert_eq!(err.rule(), Some(Rule::InvalidArn), "{}", bad);
            assert!(err.to_string().contains("at least 6 components"));
        }
    }

    #[test]
    fn test_deferred_arn_uses_select_split() {
        let arn = Expr::get_att(bus(), "Arn");
        let parsed = parse_arn(&arn, ArnFormat::SlashResourceName).unwrap();
        assert_eq!(
            render(parsed.account.as_ref().unwrap()),
            json!({"Fn::Select": [4, {"Fn::Split": [":", {"Fn::GetAtt": ["BusEA82B648", "Arn"]}]}]})
        );
        assert_eq!(
            render(parsed.region.as_ref().unwrap()),
            json!({"Fn::Select": [3, {"Fn::Split": [":", {"Fn::GetAtt": ["BusEA82B648", "Arn"]}]}]})
        );
        assert_eq!(
            render(parsed.resource_name.as_ref().unwrap()),
            json!({"Fn::Select": [1, {"Fn::Split": ["/", {"Fn::Select": [5, {"Fn::Split": [":", {"Fn::GetAtt": ["BusEA82B648", "Arn"]}]}]}]}]})
        );
    }

    #[test]
    fn test_join_with_literal_separators_keeps_literal_segments() {
        let arn = Expr::join(
            ":",
            vec![
                "arn".into(),
                Expr::pseudo(Pseudo::Partition),
                "events".into(),
                "us-west-1".into(),
                "myAccount".into(),
                Expr::join("/", vec!["event-bus".into(), Expr::reference(bus())]),
            ],
        );
        let parsed = parse_arn(&arn, ArnFormat::SlashResourceName).unwrap();
        assert_eq!(parsed.partition, Some(Expr::pseudo(Pseudo::Partition)));
        assert_eq!(parsed.region, Some(Expr::string("us-west-1")));
        assert_eq!(parsed.account, Some(Expr::string("myAccount")));
        assert_eq!(parsed.resource, Expr::string("event-bus"));
        assert_eq!(parsed.resource_name, Some(Expr::reference(bus())));
    }

    #[test]
    fn test_mixed_segment_becomes_concat() {
        let arn = Expr::concat(vec![
            "arn:aws:sns:us-east-1:1:topic-".into(),
            Expr::reference(bus()),
        ]);
        let parsed = parse_arn(&arn, ArnFormat::NoResourceName).unwrap();
        assert_eq!(
            parsed.resource,
            Expr::concat(vec!["topic-".into(), Expr::reference(bus())])
        );
    }

    #[test]
    fn test_select_tree_agrees_with_literal_parse() {
        let cases = [
            ("arn:aws:sqs:us-east-1:123456789012:queue", ArnFormat::NoResourceName),
            ("arn:aws:s3:::bucket/a/b", ArnFormat::NoResourceName),
            (
                "arn:aws:events:us-west-1:myAccount:event-bus/myEventBus",
                ArnFormat::SlashResourceName,
            ),
            (
                "arn:aws:lambda:eu-west-1:123456789012:function:my-alias",
                ArnFormat::ColonResourceName,
            ),
        ];
        for (text, format) in cases {
            let direct = parse_arn(&Expr::string(text), format).unwrap();
            let deferred = select_tree(&Expr::string(text), format);
            for part in ["partition", "service", "region", "account", "resource", "resourceName"] {
                assert_eq!(
                    deferred.part(part).map(fold),
                    direct.part(part).cloned(),
                    "{} {}",
                    text,
                    part
                );
            }
        }
    }

    #[test]
    fn test_multi_colon_name_rejected_on_every_literal_path() {
        let text = "arn:aws:lambda:eu-west-1:123456789012:function:my:alias";
        assert!(parse_arn(&Expr::string(text), ArnFormat::ColonResourceName).is_err());

        let joined = Expr::join(
            ":",
            vec![
                "arn".into(),
                Expr::pseudo(Pseudo::Partition),
                "lambda:eu-west-1:123456789012:function:my:alias".into(),
            ],
        );
        let err = parse_arn(&joined, ArnFormat::ColonResourceName).unwrap_err();
        assert_eq!(err.rule(), Some(Rule::InvalidArn));
    }

    #[test]
    fn test_environment_from_parsed_arn() {
        let parsed = parse_arn(
            &Expr::string("arn:aws:events:us-west-1:myAccount:event-bus/bus"),
            ArnFormat::SlashResourceName,
        )
        .unwrap();
        let env = parsed.environment(&StackEnv::agnostic());
        assert_eq!(env.account, Expr::string("myAccount"));
        assert_eq!(env.same_account(&StackEnv::agnostic()), None);
        assert_eq!(
            env.same_account(&StackEnv::pinned("myAccount", "us-west-1")),
            Some(true)
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("Slash".parse::<ArnFormat>().unwrap(), ArnFormat::SlashResourceName);
        assert_eq!("none".parse::<ArnFormat>().unwrap(), ArnFormat::NoResourceName);
        assert!("dot".parse::<ArnFormat>().is_err());
    }
}
