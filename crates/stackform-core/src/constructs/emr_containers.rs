//! EMR on EKS `StartJobRun` state-machine task

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::arn::ArnComponents;
use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::expr::{Expr, Pseudo};
use crate::stack::Stack;

use super::iam::PolicyStatement;

/// How the state machine waits on the integrated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationPattern {
    RequestResponse,
    #[default]
    RunJob,
    WaitForTaskToken,
}

impl IntegrationPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationPattern::RequestResponse => "REQUEST_RESPONSE",
            IntegrationPattern::RunJob => "RUN_JOB",
            IntegrationPattern::WaitForTaskToken => "WAIT_FOR_TASK_TOKEN",
        }
    }

    /// Suffix appended to the integration resource ARN
    fn resource_suffix(&self) -> &'static str {
        match self {
            IntegrationPattern::RequestResponse => "",
            IntegrationPattern::RunJob => ".sync",
            IntegrationPattern::WaitForTaskToken => ".waitForTaskToken",
        }
    }
}

impl fmt::Display for IntegrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationPattern {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUEST_RESPONSE" => Ok(IntegrationPattern::RequestResponse),
            "RUN_JOB" => Ok(IntegrationPattern::RunJob),
            "WAIT_FOR_TASK_TOKEN" => Ok(IntegrationPattern::WaitForTaskToken),
            _ => Err(ValidationError::new(
                Rule::Unsupported,
                s,
                format!("unknown integration pattern '{}'", s),
            )
            .into()),
        }
    }
}

const SUPPORTED_PATTERNS: [IntegrationPattern; 2] = [
    IntegrationPattern::RequestResponse,
    IntegrationPattern::RunJob,
];

/// `arn:<partition>:states:::<service>:<api><suffix>`
pub fn integration_resource_arn(service: &str, api: &str, pattern: IntegrationPattern) -> Expr {
    Expr::concat(vec![
        "arn:".into(),
        Expr::pseudo(Pseudo::Partition),
        format!(":states:::{}:{}{}", service, api, pattern.resource_suffix()).into(),
    ])
}

// =============================================================================
// JOB PROPERTIES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SparkSubmitJobDriver {
    pub entry_point: Expr,
    pub entry_point_arguments: Option<Expr>,
    pub spark_submit_parameters: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplicationConfiguration {
    pub classification: String,
    pub properties: BTreeMap<String, Expr>,
    pub nested: Vec<ApplicationConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Monitoring {
    pub log_group_name: Option<Expr>,
    pub log_stream_name_prefix: Option<Expr>,
    pub persistent_app_ui: Option<bool>,
    pub log_bucket_uri: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartJobRunProps {
    pub name: Option<Expr>,
    pub virtual_cluster_id: Expr,
    pub execution_role_arn: Expr,
    pub release_label: Expr,
    pub job_driver: SparkSubmitJobDriver,
    pub application_config: Vec<ApplicationConfiguration>,
    pub monitoring: Option<Monitoring>,
    pub tags: BTreeMap<String, Expr>,
    pub integration_pattern: IntegrationPattern,
}

impl StartJobRunProps {
    pub fn new(
        virtual_cluster_id: impl Into<Expr>,
        execution_role_arn: impl Into<Expr>,
        release_label: impl Into<Expr>,
        entry_point: impl Into<Expr>,
    ) -> Self {
        Self {
            name: None,
            virtual_cluster_id: virtual_cluster_id.into(),
            execution_role_arn: execution_role_arn.into(),
            release_label: release_label.into(),
            job_driver: SparkSubmitJobDriver {
                entry_point: entry_point.into(),
                entry_point_arguments: None,
                spark_submit_parameters: None,
            },
            application_config: Vec::new(),
            monitoring: None,
            tags: BTreeMap::new(),
            integration_pattern: IntegrationPattern::default(),
        }
    }
}

/// Map of the entries whose value is present
fn present<const N: usize>(entries: [(&str, Option<Expr>); N]) -> Expr {
    Expr::map(entries.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))))
}

fn non_empty(e: Expr) -> Option<Expr> {
    match &e {
        Expr::Map(m) if m.is_empty() => None,
        Expr::List(l) if l.is_empty() => None,
        _ => Some(e),
    }
}

impl SparkSubmitJobDriver {
    fn to_expr(&self) -> Expr {
        Expr::map([(
            "SparkSubmitJobDriver",
            present([
                ("EntryPoint", Some(self.entry_point.clone())),
                ("EntryPointArguments", self.entry_point_arguments.clone()),
                ("SparkSubmitParameters", self.spark_submit_parameters.clone()),
            ]),
        )])
    }
}

impl ApplicationConfiguration {
    fn to_expr(&self) -> Expr {
        present([
            ("Classification", Some(Expr::string(self.classification.clone()))),
            (
                "Configurations",
                non_empty(Expr::list(self.nested.iter().map(Self::to_expr).collect())),
            ),
            ("Properties", non_empty(Expr::Map(self.properties.clone()))),
        ])
    }
}

impl Monitoring {
    fn to_expr(&self) -> Option<Expr> {
        let cloud_watch = self.log_group_name.as_ref().map(|group| {
            present([
                ("LogGroupName", Some(group.clone())),
                ("LogStreamNamePrefix", self.log_stream_name_prefix.clone()),
            ])
        });
        let s3 = self
            .log_bucket_uri
            .as_ref()
            .map(|uri| Expr::map([("LogUri", uri.clone())]));
        let persistent = self
            .persistent_app_ui
            .map(|on| Expr::string(if on { "ENABLED" } else { "DISABLED" }));

        non_empty(present([
            ("CloudWatchMonitoringConfiguration", cloud_watch),
            ("PersistentAppUI", persistent),
            ("S3MonitoringConfiguration", s3),
        ]))
    }
}

// =============================================================================
// TASK
// =============================================================================

/// Rendered task state plus the permissions its execution role needs.
#[derive(Debug, Clone, PartialEq)]
pub struct StartJobRun {
    pub resource: Expr,
    pub parameters: Expr,
    pub policy_statements: Vec<PolicyStatement>,
}

impl StartJobRun {
    pub fn new(stack: &Stack, props: &StartJobRunProps) -> SynthResult<Self> {
        let pattern = props.integration_pattern;
        if !SUPPORTED_PATTERNS.contains(&pattern) {
            let supported: Vec<&str> = SUPPORTED_PATTERNS.iter().map(|p| p.as_str()).collect();
            return Err(ValidationError::new(
                Rule::Unsupported,
                pattern.as_str(),
                format!(
                    "Unsupported service integration pattern. Supported Patterns: {}. Received: {}",
                    supported.join(","),
                    pattern
                ),
            )
            .into());
        }

        Ok(Self {
            resource: integration_resource_arn("emr-containers", "startJobRun", pattern),
            parameters: render_parameters(props),
            policy_statements: policy_statements(stack, pattern),
        })
    }

    /// The task state's `Resource` / `Parameters` pair
    pub fn to_expr(&self) -> Expr {
        Expr::map([
            ("Resource", self.resource.clone()),
            ("Parameters", self.parameters.clone()),
        ])
    }
}

fn render_parameters(props: &StartJobRunProps) -> Expr {
    let overrides = non_empty(present([
        (
            "ApplicationConfiguration",
            non_empty(Expr::list(
                props
                    .application_config
                    .iter()
                    .map(ApplicationConfiguration::to_expr)
                    .collect(),
            )),
        ),
        (
            "MonitoringConfiguration",
            props.monitoring.as_ref().and_then(Monitoring::to_expr),
        ),
    ]));

    let tags = non_empty(Expr::list(
        props
            .tags
            .iter()
            .map(|(k, v)| Expr::map([("Key", Expr::string(k.clone())), ("Value", v.clone())]))
            .collect(),
    ));

    present([
        ("Name", props.name.clone()),
        ("VirtualClusterId", Some(props.virtual_cluster_id.clone())),
        ("ExecutionRoleArn", Some(props.execution_role_arn.clone())),
        ("ReleaseLabel", Some(props.release_label.clone())),
        ("JobDriver", Some(props.job_driver.to_expr())),
        ("ConfigurationOverrides", overrides),
        ("Tags", tags),
    ])
}

fn policy_statements(stack: &Stack, pattern: IntegrationPattern) -> Vec<PolicyStatement> {
    // StartJobRun also needs the leading-slash resource form
    let clusters = ["virtualclusters", "/virtualclusters"]
        .into_iter()
        .map(|resource| {
            stack.format_arn(&ArnComponents::new("emr-containers", resource).resource_name("*"))
        })
        .collect();

    let mut statements = vec![PolicyStatement::allow(
        [
            "emr-containers:StartJobRun",
            "emr-containers:DescribeJobRun",
            "emr-containers:CancelJobRun",
        ],
        clusters,
    )];

    if pattern == IntegrationPattern::RunJob {
        statements.push(PolicyStatement::allow(
            ["events:PutTargets", "events:PutRule", "events:DescribeRule"],
            vec![stack.format_arn(
                &ArnComponents::new("events", "rule")
                    .resource_name("StepFunctionsEventsForEmrOnEksStartJobRunFlowStepsRule"),
            )],
        ));
    }
    statements
}
