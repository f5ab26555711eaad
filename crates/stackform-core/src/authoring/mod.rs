//! YAML authoring format
//!
//! `stackform.yaml` → [`dto::AppDto`] (serde) → [`crate::app::App`].

pub mod build;
pub mod dto;
pub mod yaml;

pub use build::{compile_app, compile_from_yaml};
pub use dto::AppDto;
pub use yaml::parse_app_yaml;
