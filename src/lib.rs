//! # WIDL Compiler Library
//!
//! WIDL describes plain data interfaces (enums, and interfaces with typed
//! attributes and operations) annotated with extension attributes. The
//! compiler turns a WIDL source into structured contexts for a C++ data model
//! (struct declarations, comparison, JSON load/save and merge logic) and for a
//! Python binding module. Rendering those contexts into text is left to a
//! template engine.
//!
//! ## Core Components
//!
//! - **Lexer** (`lexer`): Tokenizes WIDL source text.
//! - **Parser** (`parser`): Builds the entity tree, rejecting duplicate names.
//! - **AST** (`ast`): Entities and the type tree with its visitor.
//! - **Extension attributes** (`ext_attrs`): Per-entity schemas resolving raw annotations into typed values.
//! - **Order** (`order`): Batched topological ordering of definitions.
//! - **Scalars** (`scalars`): Builtin and opaque type names shared by the ordering and the backends.
//! - **Generators** (`generators`): The C++ and Python decision engines.
//! - **Diagnostics** (`diagnostics`): Non-fatal warnings collected during a run.
//!
//! ## Usage
//!
//! The typical compilation flow is:
//! 1.  **Parsing**: `parser::parse(source)?` creates an `IdlModule`.
//! 2.  **Ordering**: `order::reorder(module, &mut diagnostics)?` puts dependencies first.
//! 3.  **Planning**: each `CodeGenerator` derives its own context from the ordered module.
//!
//! [`compile`] runs all three steps with default configurations.
//!
//! ## Example
//!
//! ```rust
//! use widl::generators::CodeGenerator;
//! use widl::generators::cpp::CppGenerator;
//!
//! let source = "
//!     enum Color { RED, GREEN, BLUE };
//!     interface Pin {
//!         attribute Color color;
//!     };
//! ";
//!
//! let compilation = widl::compile(source).unwrap();
//! let pin = &compilation.cpp.interfaces[0];
//! assert_eq!(pin.name, "Pin");
//! assert!(compilation.diagnostics.is_empty());
//!
//! // The JSON form is what a template renderer consumes.
//! let context = CppGenerator::default().to_json(&compilation.cpp).unwrap();
//! assert_eq!(context["interfaces"][0]["name"], "Pin");
//! ```

pub mod ast;
pub mod diagnostics;
pub mod ext_attrs;
pub mod generators;
pub mod lexer;
pub mod order;
pub mod parser;
pub mod scalars;

mod color;

use ast::IdlModule;
use diagnostics::Diagnostics;
use generators::{
    CodeGenerator, CompileError,
    cpp::{CppContext, CppGenerator},
    py::{PyContext, PythonGenerator},
};

/// Everything one compilation run produced.
#[derive(Debug)]
pub struct Compilation {
    /// The module in declaration order.
    pub module: IdlModule,
    pub cpp: CppContext,
    pub python: PyContext,
    pub diagnostics: Diagnostics,
}

/// Parses, orders and plans a source text for both backends.
///
/// A syntax error, a duplicate definition or an extension attribute violating
/// its schema aborts the run; everything else is reported through [`Compilation::diagnostics`].
pub fn compile(source: &str) -> Result<Compilation, CompileError> {
    let mut diagnostics = Diagnostics::new();
    let module = order::reorder(parser::parse(source)?, &mut diagnostics)?;

    let cpp = CppGenerator::default().generate(&module, &mut diagnostics)?;
    let python = PythonGenerator::default().generate(&module, &mut diagnostics)?;

    tracing::info!(
        definitions = module.definitions.len(),
        warnings = diagnostics.warnings().len(),
        "compiled module"
    );

    Ok(Compilation {
        module,
        cpp,
        python,
        diagnostics,
    })
}
