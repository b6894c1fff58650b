use std::fmt;

use crate::lexer::Position;

/// Represents a type in the IDL.
///
/// Wrapper variants hold exactly one sub-type; nesting is unrestricted.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Type {
    /// A named scalar, opaque or project-defined type.
    Simple(String),
    /// An ordered, repeatable collection of the sub-type.
    Sequence(Box<Type>),
    /// A present-or-absent wrapper around the sub-type.
    Optional(Box<Type>),
    /// A language-tag keyed mapping to the sub-type.
    Translatable(Box<Type>),
}

/// Which wrapper a [`TypeVisitor::on_complex`] call comes from.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Wrapper {
    Sequence,
    Optional,
    Translatable,
}

/// Traversal over a [`Type`] tree.
///
/// Only `on_simple` is mandatory. The wrapper callbacks fall through to
/// `on_complex`, which by default descends into the wrapped type, so a visitor
/// overriding a subset of variants still reaches every leaf.
pub trait TypeVisitor: Sized {
    type Output;

    fn on_simple(&mut self, name: &str) -> Self::Output;

    fn on_complex(&mut self, _wrapper: Wrapper, sub: &Type) -> Self::Output {
        sub.accept(self)
    }

    fn on_sequence(&mut self, sub: &Type) -> Self::Output {
        self.on_complex(Wrapper::Sequence, sub)
    }

    fn on_optional(&mut self, sub: &Type) -> Self::Output {
        self.on_complex(Wrapper::Optional, sub)
    }

    fn on_translatable(&mut self, sub: &Type) -> Self::Output {
        self.on_complex(Wrapper::Translatable, sub)
    }
}

impl Type {
    /// Convenience constructor for a simple type.
    pub fn simple(name: impl Into<String>) -> Self {
        Type::Simple(name.into())
    }

    pub fn sequence(sub: Type) -> Self {
        Type::Sequence(Box::new(sub))
    }

    pub fn optional(sub: Type) -> Self {
        Type::Optional(Box::new(sub))
    }

    pub fn translatable(sub: Type) -> Self {
        Type::Translatable(Box::new(sub))
    }

    /// Dispatches to the visitor callback matching this variant.
    pub fn accept<V: TypeVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Type::Simple(name) => visitor.on_simple(name),
            Type::Sequence(sub) => visitor.on_sequence(sub),
            Type::Optional(sub) => visitor.on_optional(sub),
            Type::Translatable(sub) => visitor.on_translatable(sub),
        }
    }

    /// Returns the name of the innermost simple type.
    pub fn innermost(&self) -> &str {
        match self {
            Type::Simple(name) => name,
            Type::Sequence(sub) | Type::Optional(sub) | Type::Translatable(sub) => sub.innermost(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Simple(name) => write!(f, "{name}"),
            Type::Sequence(sub) => write!(f, "sequence<{sub}>"),
            Type::Optional(sub) => write!(f, "{sub}?"),
            Type::Translatable(sub) => write!(f, "translatable<{sub}>"),
        }
    }
}

// --- Extension attributes ---

/// A single argument of a raw extension attribute.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExtArgument {
    /// The argument exactly as written in the source.
    pub code: String,
    /// The unquoted value, if the argument was a string literal.
    pub string: Option<String>,
    pub position: Position,
}

impl ExtArgument {
    /// The string form if present, else the raw code form.
    pub fn text(&self) -> &str {
        self.string.as_deref().unwrap_or(&self.code)
    }
}

/// An unresolved extension attribute as produced by the parser.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExtAttribute {
    pub name: String,
    pub position: Position,
    pub args: Vec<ExtArgument>,
}

// --- Entities ---

/// Represents an enum definition.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EnumDef {
    pub name: String,
    /// Distinct item identifiers, in declaration order.
    pub items: Vec<String>,
    pub ext_attrs: Vec<ExtAttribute>,
    pub position: Position,
}

/// A typed data member of an interface.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Attribute {
    pub name: String,
    pub type_info: Type,
    pub ext_attrs: Vec<ExtAttribute>,
    pub position: Position,
}

/// A parameter of an operation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Argument {
    pub name: String,
    pub type_info: Type,
    pub ext_attrs: Vec<ExtAttribute>,
    pub position: Position,
}

/// A method declared on an interface.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Operation {
    pub name: String,
    pub return_type: Type,
    pub args: Vec<Argument>,
    pub ext_attrs: Vec<ExtAttribute>,
    pub position: Position,
}

/// Represents an interface definition.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InterfaceDef {
    pub name: String,
    /// The explicitly inherited interface, if any.
    pub inheritance: Option<String>,
    pub attributes: Vec<Attribute>,
    pub operations: Vec<Operation>,
    pub ext_attrs: Vec<ExtAttribute>,
    pub position: Position,
}

impl InterfaceDef {
    /// Visits the types of every attribute, operation return and argument.
    pub fn visit_all_types<V: TypeVisitor>(&self, visitor: &mut V) {
        for attribute in &self.attributes {
            attribute.type_info.accept(visitor);
        }
        for operation in &self.operations {
            operation.return_type.accept(visitor);
            for arg in &operation.args {
                arg.type_info.accept(visitor);
            }
        }
    }
}

// --- Top-Level Definitions and Module ---

/// Represents a top-level definition in an IDL module.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Definition {
    Enum(EnumDef),
    Interface(InterfaceDef),
}

impl Definition {
    /// Returns the name of the definition.
    pub fn name(&self) -> &str {
        match self {
            Definition::Enum(e) => &e.name,
            Definition::Interface(i) => &i.name,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Definition::Enum(e) => e.position,
            Definition::Interface(i) => i.position,
        }
    }

    pub fn ext_attrs(&self) -> &[ExtAttribute] {
        match self {
            Definition::Enum(e) => &e.ext_attrs,
            Definition::Interface(i) => &i.ext_attrs,
        }
    }
}

/// An ordered list of definitions.
///
/// Definition names are unique; the parser rejects duplicates and hand-built
/// modules must uphold the same precondition.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct IdlModule {
    pub definitions: Vec<Definition>,
}

impl IdlModule {
    pub fn new(definitions: Vec<Definition>) -> Self {
        IdlModule { definitions }
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.iter().find(|def| def.name() == name)
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDef> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Enum(e) => Some(e),
            Definition::Interface(_) => None,
        })
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceDef> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Interface(i) => Some(i),
            Definition::Enum(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects every leaf it reaches, overriding nothing but `on_simple`.
    struct Leaves(Vec<String>);

    impl TypeVisitor for Leaves {
        type Output = ();

        fn on_simple(&mut self, name: &str) {
            self.0.push(name.to_string());
        }
    }

    /// Spells a type, overriding only the sequence wrapper.
    struct Brackets;

    impl TypeVisitor for Brackets {
        type Output = String;

        fn on_simple(&mut self, name: &str) -> String {
            name.to_string()
        }

        fn on_sequence(&mut self, sub: &Type) -> String {
            format!("{}[]", sub.accept(self))
        }
    }

    fn interface(attributes: Vec<(&str, Type)>) -> InterfaceDef {
        InterfaceDef {
            name: "I".to_string(),
            inheritance: None,
            attributes: attributes
                .into_iter()
                .map(|(name, type_info)| Attribute {
                    name: name.to_string(),
                    type_info,
                    ext_attrs: vec![],
                    position: Position::default(),
                })
                .collect(),
            operations: vec![],
            ext_attrs: vec![],
            position: Position::default(),
        }
    }

    #[test]
    fn test_default_wrappers_reach_leaves() {
        let ty = Type::optional(Type::sequence(Type::translatable(Type::simple("string"))));
        let mut leaves = Leaves(vec![]);
        ty.accept(&mut leaves);
        assert_eq!(leaves.0, vec!["string"]);
    }

    #[test]
    fn test_partial_override_recurses_through_unknown_wrappers() {
        let ty = Type::optional(Type::sequence(Type::optional(Type::simple("int"))));
        // Optional wrappers fall through to their sub-type.
        assert_eq!(ty.accept(&mut Brackets), "int[]");
    }

    #[test]
    fn test_innermost() {
        let ty = Type::sequence(Type::optional(Type::simple("Pin")));
        assert_eq!(ty.innermost(), "Pin");
        assert_eq!(ty.to_string(), "sequence<Pin?>");
    }

    #[test]
    fn test_visit_all_types_visits_each_leaf_once() {
        let mut def = interface(vec![("a", Type::simple("A")), ("b", Type::sequence(Type::simple("B")))]);
        def.operations.push(Operation {
            name: "op".to_string(),
            return_type: Type::simple("void"),
            args: vec![Argument {
                name: "x".to_string(),
                type_info: Type::optional(Type::simple("C")),
                ext_attrs: vec![],
                position: Position::default(),
            }],
            ext_attrs: vec![],
            position: Position::default(),
        });
        let mut leaves = Leaves(vec![]);
        def.visit_all_types(&mut leaves);
        assert_eq!(leaves.0, vec!["A", "B", "void", "C"]);
    }

    #[test]
    fn test_ext_argument_text_prefers_string_form() {
        let quoted = ExtArgument {
            code: "\"HAS_X\"".to_string(),
            string: Some("HAS_X".to_string()),
            position: Position::default(),
        };
        let raw = ExtArgument {
            code: "HAS_Y".to_string(),
            string: None,
            position: Position::default(),
        };
        assert_eq!(quoted.text(), "HAS_X");
        assert_eq!(raw.text(), "HAS_Y");
    }

    #[test]
    fn test_module_helpers() {
        let module = IdlModule::new(vec![
            Definition::Enum(EnumDef {
                name: "Color".to_string(),
                items: vec!["RED".to_string()],
                ext_attrs: vec![],
                position: Position::default(),
            }),
            Definition::Interface(interface(vec![])),
        ]);
        assert_eq!(module.enums().count(), 1);
        assert_eq!(module.interfaces().count(), 1);
        assert_eq!(module.get("I").map(Definition::name), Some("I"));
        assert!(module.get("Missing").is_none());
    }
}
