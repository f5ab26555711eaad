//! Higher-level constructs built on [`crate::stack::Stack`]
//!
//! Each construct only adds resources through the stack API, so every
//! invariant (unique ids, acyclic references, eager validation) holds for
//! them too.

pub mod custom_resource;
pub mod emr_containers;
pub mod event_bus;
pub mod function;
pub mod iam;

pub use custom_resource::{CustomResource, CustomResourceProps, Provider};
pub use emr_containers::{IntegrationPattern, StartJobRun, StartJobRunProps};
pub use event_bus::{ArchiveProps, EventBus, EventBusProps};
pub use function::{FunctionProps, SingletonFunction};
pub use iam::{Grant, GrantTarget, PolicyDocument, PolicyStatement, Principal, Role};
