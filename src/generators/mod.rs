use serde::Serialize;
use thiserror::Error;

use crate::{
    ast::IdlModule, diagnostics::Diagnostics, ext_attrs::SchemaViolation, order::DuplicateDefinition,
    parser::ParseError,
};

pub mod cpp;
pub mod py;

/// A backend decision engine.
///
/// A generator walks a linearized module and derives a backend-owned context
/// for the template renderer. It never mutates the module, so several
/// generators may run over the same module in any order.
pub trait CodeGenerator {
    type Context: Serialize;

    /// Short backend name, used in logs.
    fn language(&self) -> &str;

    /// Derives the context for every definition of the module.
    fn generate(&self, module: &IdlModule, diagnostics: &mut Diagnostics) -> Result<Self::Context, CompileError>;

    /// Converts a context into the JSON value handed to the renderer.
    fn to_json(&self, context: &Self::Context) -> Result<serde_json::Value, CompileError> {
        Ok(serde_json::to_value(context)?)
    }
}

/// Fatal failures of a compilation run.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Duplicate(#[from] DuplicateDefinition),
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error("failed to build renderer context: {0}")]
    Context(#[from] serde_json::Error),
}
