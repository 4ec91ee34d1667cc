//! Shared utilities: program resolution and argument templates.

pub mod binary;
pub mod template;

pub use binary::{resolve_program, validate_program, validate_program_spec, CommandError};
pub use template::{expand, placeholders, TemplateError};
