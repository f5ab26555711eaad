//! Removal policy → lifecycle attributes
//!
//! | RemovalPolicy | DeletionPolicy | UpdateReplacePolicy |
//! |---------------|----------------|---------------------|
//! | unspecified   | Delete         | Delete              |
//! | destroy       | Delete         | Delete              |
//! | retain        | Retain         | Retain              |
//! | snapshot      | Snapshot       | Snapshot            |
//!
//! Snapshot is only accepted for resource types that can take one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Rule, SynthError, SynthResult, ValidationError};
use crate::resource::ResourceRecord;

/// Resource types whose deletion can take a final snapshot
const SNAPSHOT_TYPES: &[&str] = &[
    "AWS::DocDB::DBCluster",
    "AWS::EC2::Volume",
    "AWS::ElastiCache::CacheCluster",
    "AWS::ElastiCache::ReplicationGroup",
    "AWS::Neptune::DBCluster",
    "AWS::RDS::DBCluster",
    "AWS::RDS::DBInstance",
    "AWS::Redshift::Cluster",
];

pub fn supports_snapshot(resource_type: &str) -> bool {
    SNAPSHOT_TYPES.contains(&resource_type)
}

/// What happens to the physical resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
    Snapshot,
}

impl FromStr for RemovalPolicy {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "destroy" => Ok(RemovalPolicy::Destroy),
            "retain" => Ok(RemovalPolicy::Retain),
            "snapshot" => Ok(RemovalPolicy::Snapshot),
            _ => Err(ValidationError::new(
                Rule::UnknownPolicy,
                s,
                format!(
                    "unknown removal policy '{}' (expected destroy, retain or snapshot)",
                    s
                ),
            )
            .into()),
        }
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemovalPolicy::Destroy => "destroy",
            RemovalPolicy::Retain => "retain",
            RemovalPolicy::Snapshot => "snapshot",
        })
    }
}

/// Value of `DeletionPolicy` / `UpdateReplacePolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionPolicy::Delete => "Delete",
            DeletionPolicy::Retain => "Retain",
            DeletionPolicy::Snapshot => "Snapshot",
        }
    }
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub deletion: DeletionPolicy,
    pub update_replace: DeletionPolicy,
}

/// Map a removal policy onto the lifecycle pair of `resource_type`.
pub fn lifecycle_for(policy: Option<RemovalPolicy>, resource_type: &str) -> SynthResult<Lifecycle> {
    let p = match policy.unwrap_or_default() {
        RemovalPolicy::Destroy => DeletionPolicy::Delete,
        RemovalPolicy::Retain => DeletionPolicy::Retain,
        RemovalPolicy::Snapshot => {
            if !supports_snapshot(resource_type) {
                return Err(ValidationError::new(
                    Rule::Unsupported,
                    resource_type,
                    format!(
                        "removal policy 'snapshot' is not supported by resource type {}",
                        resource_type
                    ),
                )
                .into());
            }
            DeletionPolicy::Snapshot
        }
    };
    Ok(Lifecycle {
        deletion: p,
        update_replace: p,
    })
}

/// Apply a removal policy to a record (last application wins).
pub fn with_removal_policy(
    record: &mut ResourceRecord,
    policy: Option<RemovalPolicy>,
) -> SynthResult<()> {
    record.lifecycle = Some(lifecycle_for(policy, &record.resource_type)?);
    Ok(())
}
