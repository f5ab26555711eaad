//! stackform-core: deferred-value template synthesis
//!
//! This crate builds infrastructure documents out of values that may only
//! be known at deploy time. It contains NO I/O:
//! - Expression tree, placeholders and the folding resolver
//! - ARN formatting and parsing over deferred values
//! - Stacks, logical-id allocation and the per-stack singleton registry
//! - Removal-policy mapping and construction-time name validators
//! - Document emission and cross-stack export/import wiring
//! - A small construct library (custom resources, event buses, IAM)
//! - YAML authoring format compiled into an [`App`]

pub mod app;
pub mod arn;
pub mod authoring;
pub mod conditions;
pub mod constructs;
pub mod env;
pub mod error;
pub mod expr;
pub mod graph;
pub mod lifecycle;
pub mod naming;
pub mod registry;
pub mod resolve;
pub mod resource;
pub mod stack;
pub mod template;
pub mod token;
pub mod validate;

// Re-export commonly used types
pub use app::{App, Assembly};
pub use arn::{format_arn, parse_arn, ArnComponents, ArnFormat};
pub use conditions::ConditionExpr;
pub use env::{ResourceEnvironment, StackEnv};
pub use error::{Rule, SynthError, SynthResult, ValidationError};
pub use expr::{Expr, LogicalRef, Pseudo};
pub use lifecycle::{lifecycle_for, DeletionPolicy, Lifecycle, RemovalPolicy};
pub use registry::SingletonRegistry;
pub use resolve::{render, resolve, KnownValues, Resolver};
pub use resource::ResourceHandle;
pub use stack::{Output, Stack};
pub use template::Template;
pub use token::TokenId;
pub use validate::{validate_custom_resource_type, validate_event_bus_names};
