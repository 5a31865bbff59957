//! Report rendering.

pub mod generator;

pub use generator::{no_projects_message, render, write_report};
