//! Extension attribute schemas.
//!
//! Every entity kind owns a fixed, ordered table of field resolvers. Resolving
//! a raw attribute list seeds each field with its default, then walks the raw
//! attributes in order:
//!
//! - an unknown name is reported as a warning and skipped,
//! - a known name with the wrong shape aborts with a [`SchemaViolation`],
//! - a known name with the right shape overwrites the field; when a name
//!   repeats, the last occurrence wins.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::{
    ast::{Argument, Attribute, ExtArgument, ExtAttribute, InterfaceDef, Operation},
    diagnostics::{Diagnostics, WarningKind},
    lexer::Position,
};

/// A known extension attribute used with the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid extension attribute '{attribute}' at position {position}: {message}")]
pub struct SchemaViolation {
    pub position: Position,
    pub attribute: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(position: Position, attribute: &str, message: String) -> Self {
        SchemaViolation {
            position,
            attribute: attribute.to_string(),
            message,
        }
    }
}

/// One `(type, name)` entry of a merge parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeParam {
    pub type_name: String,
    pub name: String,
}

impl MergeParam {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        MergeParam {
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

/// A resolved field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Flag(bool),
    Text(Option<String>),
    List(Vec<String>),
    Pairs(Vec<MergeParam>),
}

/// The shape a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Presence only; takes no arguments.
    Flag,
    /// Exactly one argument from a closed set.
    SingleChoice {
        allowed: &'static [&'static str],
        default: &'static str,
    },
    /// Exactly one argument, kept as written.
    FreeString,
    /// Exactly one argument, string form preferred over code form.
    Guard,
    /// Any number of guard arguments, in order.
    GuardList,
    /// Any number of `"<type> <name>"` string arguments.
    PairList,
    /// Exactly one argument, used verbatim as an initializer.
    DefaultLiteral,
}

impl FieldKind {
    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::Flag => Value::Flag(false),
            FieldKind::SingleChoice { default, .. } => Value::Text(Some(default.to_string())),
            FieldKind::FreeString | FieldKind::Guard | FieldKind::DefaultLiteral => Value::Text(None),
            FieldKind::GuardList => Value::List(Vec::new()),
            FieldKind::PairList => Value::Pairs(Vec::new()),
        }
    }

    /// Validates the raw attribute against this shape.
    pub fn resolve(&self, attr: &ExtAttribute) -> Result<Value, SchemaViolation> {
        match self {
            FieldKind::Flag => {
                if !attr.args.is_empty() {
                    return Err(SchemaViolation::new(
                        attr.position,
                        &attr.name,
                        format!("expects no arguments, got {}", attr.args.len()),
                    ));
                }
                Ok(Value::Flag(true))
            }
            FieldKind::SingleChoice { allowed, .. } => {
                let arg = single_argument(attr)?;
                let value = arg.text();
                if !allowed.contains(&value) {
                    return Err(SchemaViolation::new(
                        arg.position,
                        &attr.name,
                        format!("expected one of {}, found '{value}'", allowed.join(", ")),
                    ));
                }
                Ok(Value::Text(Some(value.to_string())))
            }
            FieldKind::FreeString | FieldKind::DefaultLiteral => {
                Ok(Value::Text(Some(single_argument(attr)?.code.clone())))
            }
            FieldKind::Guard => Ok(Value::Text(Some(single_argument(attr)?.text().to_string()))),
            FieldKind::GuardList => Ok(Value::List(
                attr.args.iter().map(|arg| arg.text().to_string()).collect(),
            )),
            FieldKind::PairList => attr
                .args
                .iter()
                .map(|arg| split_pair(attr, arg))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Pairs),
        }
    }
}

fn single_argument(attr: &ExtAttribute) -> Result<&ExtArgument, SchemaViolation> {
    match attr.args.as_slice() {
        [arg] => Ok(arg),
        args => Err(SchemaViolation::new(
            attr.position,
            &attr.name,
            format!("expects exactly one argument, got {}", args.len()),
        )),
    }
}

/// Splits `"<type> <name>"` at the last whitespace, so multi-word and
/// qualified type names stay intact.
fn split_pair(attr: &ExtAttribute, arg: &ExtArgument) -> Result<MergeParam, SchemaViolation> {
    let text = arg.text().trim();
    match text.rsplit_once(char::is_whitespace) {
        Some((type_name, name)) if !type_name.trim().is_empty() && !name.is_empty() => {
            Ok(MergeParam::new(type_name.trim(), name))
        }
        _ => Err(SchemaViolation::new(
            arg.position,
            &attr.name,
            format!("expected '<type> <name>', found '{text}'"),
        )),
    }
}

/// A named field of a schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldResolver {
    FieldResolver { name, kind }
}

/// The fixed field table of one entity kind.
#[derive(Debug)]
pub struct Schema {
    pub entity: &'static str,
    pub fields: &'static [FieldResolver],
}

pub static ENUM_SCHEMA: Schema = Schema {
    entity: "enum",
    fields: &[],
};

pub static INTERFACE_SCHEMA: Schema = Schema {
    entity: "interface",
    fields: &[
        field(
            "from",
            FieldKind::SingleChoice {
                allowed: &["node", "map"],
                default: "map",
            },
        ),
        field(
            "merge",
            FieldKind::SingleChoice {
                allowed: &["manual", "none", "auto"],
                default: "auto",
            },
        ),
        field("merge_with", FieldKind::PairList),
        field("spaceship", FieldKind::Flag),
        field("load_postproc", FieldKind::Flag),
        field("merge_postproc", FieldKind::Flag),
    ],
};

pub static ATTRIBUTE_SCHEMA: Schema = Schema {
    entity: "attribute",
    fields: &[
        field(
            "empty",
            FieldKind::SingleChoice {
                allowed: &["warn", "allow"],
                default: "warn",
            },
        ),
        field("or_value", FieldKind::Flag),
        field("load_as", FieldKind::FreeString),
        field("guard", FieldKind::Guard),
        field("guards", FieldKind::GuardList),
        field("default", FieldKind::DefaultLiteral),
        field("merge_with", FieldKind::PairList),
    ],
};

pub static OPERATION_SCHEMA: Schema = Schema {
    entity: "operation",
    fields: &[
        field("mutable", FieldKind::Flag),
        field("throws", FieldKind::Flag),
        field("static", FieldKind::Flag),
        field("external", FieldKind::Flag),
        field("guard", FieldKind::Guard),
        field("guards", FieldKind::GuardList),
    ],
};

pub static ARGUMENT_SCHEMA: Schema = Schema {
    entity: "argument",
    fields: &[field("in", FieldKind::Flag), field("out", FieldKind::Flag)],
};

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldResolver> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Resolves raw attributes into a mapping holding every schema field.
    pub fn resolve(
        &self,
        attrs: &[ExtAttribute],
        diagnostics: &mut Diagnostics,
    ) -> Result<ResolvedAttrs, SchemaViolation> {
        let mut values: IndexMap<&'static str, Value> = self
            .fields
            .iter()
            .map(|field| (field.name, field.kind.default_value()))
            .collect();

        for attr in attrs {
            let Some(field) = self.field(&attr.name) else {
                diagnostics.warn(
                    Some(attr.position),
                    WarningKind::UnknownAttribute {
                        entity: self.entity,
                        name: attr.name.clone(),
                    },
                );
                continue;
            };
            values.insert(field.name, field.kind.resolve(attr)?);
        }

        Ok(ResolvedAttrs { values })
    }
}

/// The typed result of [`Schema::resolve`], in schema field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttrs {
    values: IndexMap<&'static str, Value>,
}

impl ResolvedAttrs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(Value::Flag(true)))
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Value::Text(text)) => text.as_deref(),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.values.get(name) {
            Some(Value::List(list)) => list,
            _ => &[],
        }
    }

    pub fn pairs(&self, name: &str) -> &[MergeParam] {
        match self.values.get(name) {
            Some(Value::Pairs(pairs)) => pairs,
            _ => &[],
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    /// `guards` followed by `guard`, for kinds that carry both.
    fn combined_guards(&self) -> Vec<String> {
        let mut guards = self.list("guards").to_vec();
        if let Some(guard) = self.text("guard") {
            guards.push(guard.to_string());
        }
        guards
    }
}

// --- Typed views ---

/// Which external representation an interface loads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOfTruth {
    Node,
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// `merge` is declared and written by hand.
    Manual,
    /// No `merge` at all.
    None,
    /// `merge` is declared and generated.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPolicy {
    Warn,
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAttrs {
    pub from: SourceOfTruth,
    pub merge: MergeMode,
    pub merge_with: Vec<MergeParam>,
    pub spaceship: bool,
    pub load_postproc: bool,
    pub merge_postproc: bool,
}

impl InterfaceAttrs {
    pub fn resolve(def: &InterfaceDef, diagnostics: &mut Diagnostics) -> Result<Self, SchemaViolation> {
        let resolved = INTERFACE_SCHEMA.resolve(&def.ext_attrs, diagnostics)?;
        Ok(InterfaceAttrs {
            from: match resolved.text("from") {
                Some("node") => SourceOfTruth::Node,
                _ => SourceOfTruth::Map,
            },
            merge: match resolved.text("merge") {
                Some("manual") => MergeMode::Manual,
                Some("none") => MergeMode::None,
                _ => MergeMode::Auto,
            },
            merge_with: resolved.pairs("merge_with").to_vec(),
            spaceship: resolved.flag("spaceship"),
            load_postproc: resolved.flag("load_postproc"),
            merge_postproc: resolved.flag("merge_postproc"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeAttrs {
    pub empty: EmptyPolicy,
    pub or_value: bool,
    pub load_as: Option<String>,
    pub guards: Vec<String>,
    pub default: Option<String>,
    pub merge_with: Vec<MergeParam>,
}

impl AttributeAttrs {
    pub fn resolve(attribute: &Attribute, diagnostics: &mut Diagnostics) -> Result<Self, SchemaViolation> {
        let resolved = ATTRIBUTE_SCHEMA.resolve(&attribute.ext_attrs, diagnostics)?;
        Ok(AttributeAttrs {
            empty: match resolved.text("empty") {
                Some("allow") => EmptyPolicy::Allow,
                _ => EmptyPolicy::Warn,
            },
            or_value: resolved.flag("or_value"),
            load_as: resolved.text("load_as").map(str::to_string),
            guards: resolved.combined_guards(),
            default: resolved.text("default").map(str::to_string),
            merge_with: resolved.pairs("merge_with").to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationAttrs {
    pub mutable: bool,
    pub throws: bool,
    pub is_static: bool,
    pub external: bool,
    pub guards: Vec<String>,
}

impl OperationAttrs {
    pub fn resolve(operation: &Operation, diagnostics: &mut Diagnostics) -> Result<Self, SchemaViolation> {
        let resolved = OPERATION_SCHEMA.resolve(&operation.ext_attrs, diagnostics)?;
        Ok(OperationAttrs {
            mutable: resolved.flag("mutable"),
            throws: resolved.flag("throws"),
            is_static: resolved.flag("static"),
            external: resolved.flag("external"),
            guards: resolved.combined_guards(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentAttrs {
    pub is_in: bool,
    pub out: bool,
}

impl ArgumentAttrs {
    pub fn resolve(arg: &Argument, diagnostics: &mut Diagnostics) -> Result<Self, SchemaViolation> {
        let resolved = ARGUMENT_SCHEMA.resolve(&arg.ext_attrs, diagnostics)?;
        Ok(ArgumentAttrs {
            is_in: resolved.flag("in"),
            out: resolved.flag("out"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Type;

    fn raw(name: &str, args: &[&str]) -> ExtAttribute {
        ExtAttribute {
            name: name.to_string(),
            position: Position::new(0, 1),
            args: args
                .iter()
                .map(|code| ExtArgument {
                    code: code.to_string(),
                    string: None,
                    position: Position::new(0, 5),
                })
                .collect(),
        }
    }

    fn quoted(name: &str, args: &[&str]) -> ExtAttribute {
        let mut attr = raw(name, &[]);
        attr.args = args
            .iter()
            .map(|value| ExtArgument {
                code: format!("\"{value}\""),
                string: Some(value.to_string()),
                position: Position::new(0, 5),
            })
            .collect();
        attr
    }

    fn interface(ext_attrs: Vec<ExtAttribute>) -> InterfaceDef {
        InterfaceDef {
            name: "I".to_string(),
            inheritance: None,
            attributes: vec![],
            operations: vec![],
            ext_attrs,
            position: Position::default(),
        }
    }

    fn attribute(ext_attrs: Vec<ExtAttribute>) -> Attribute {
        Attribute {
            name: "a".to_string(),
            type_info: Type::simple("int"),
            ext_attrs,
            position: Position::default(),
        }
    }

    #[test]
    fn test_interface_defaults() {
        let mut diagnostics = Diagnostics::new();
        let attrs = InterfaceAttrs::resolve(&interface(vec![]), &mut diagnostics).unwrap();
        assert_eq!(attrs.from, SourceOfTruth::Map);
        assert_eq!(attrs.merge, MergeMode::Auto);
        assert!(attrs.merge_with.is_empty());
        assert!(!attrs.spaceship);
        assert!(!attrs.load_postproc);
        assert!(!attrs.merge_postproc);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_resolved_mapping_holds_every_field_in_schema_order() {
        let resolved = ATTRIBUTE_SCHEMA.resolve(&[], &mut Diagnostics::new()).unwrap();
        let names: Vec<&str> = resolved.names().collect();
        assert_eq!(
            names,
            vec!["empty", "or_value", "load_as", "guard", "guards", "default", "merge_with"]
        );
        assert_eq!(resolved.text("empty"), Some("warn"));
    }

    #[test]
    fn test_single_choice_arity_and_membership() {
        let mut diagnostics = Diagnostics::new();

        let err = INTERFACE_SCHEMA
            .resolve(&[raw("merge", &["auto", "none"])], &mut diagnostics)
            .unwrap_err();
        assert_eq!(err.attribute, "merge");
        assert!(err.message.contains("exactly one argument, got 2"));

        let err = INTERFACE_SCHEMA
            .resolve(&[raw("merge", &[])], &mut diagnostics)
            .unwrap_err();
        assert!(err.message.contains("got 0"));

        let err = INTERFACE_SCHEMA
            .resolve(&[raw("merge", &["sometimes"])], &mut diagnostics)
            .unwrap_err();
        assert!(err.message.contains("expected one of manual, none, auto"));
        assert_eq!(err.position, Position::new(0, 5));

        let resolved = INTERFACE_SCHEMA
            .resolve(&[raw("merge", &["none"])], &mut diagnostics)
            .unwrap();
        assert_eq!(resolved.text("merge"), Some("none"));
    }

    #[test]
    fn test_flag_rejects_arguments() {
        let err = INTERFACE_SCHEMA
            .resolve(&[raw("spaceship", &["yes"])], &mut Diagnostics::new())
            .unwrap_err();
        assert_eq!(err.attribute, "spaceship");
        assert!(err.to_string().contains("at position 1:2"));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let resolved = INTERFACE_SCHEMA
            .resolve(
                &[raw("from", &["node"]), raw("from", &["map"]), raw("merge", &["none"]), raw("merge", &["manual"])],
                &mut Diagnostics::new(),
            )
            .unwrap();
        assert_eq!(resolved.text("from"), Some("map"));
        assert_eq!(resolved.text("merge"), Some("manual"));

        let resolved = ATTRIBUTE_SCHEMA
            .resolve(&[raw("guard", &["A"]), raw("guard", &["B"])], &mut Diagnostics::new())
            .unwrap();
        assert_eq!(resolved.text("guard"), Some("B"));
    }

    #[test]
    fn test_unknown_attribute_warns_and_keeps_defaults() {
        let mut diagnostics = Diagnostics::new();
        let attrs = InterfaceAttrs::resolve(
            &interface(vec![raw("frobnicate", &["x", "y"]), raw("spaceship", &[])]),
            &mut diagnostics,
        )
        .unwrap();
        assert!(attrs.spaceship);
        assert_eq!(attrs.merge, MergeMode::Auto);
        assert_eq!(diagnostics.warnings().len(), 1);
        assert_eq!(
            diagnostics.warnings()[0].kind,
            WarningKind::UnknownAttribute {
                entity: "interface",
                name: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn test_enum_schema_knows_nothing() {
        let mut diagnostics = Diagnostics::new();
        ENUM_SCHEMA.resolve(&[raw("spaceship", &[])], &mut diagnostics).unwrap();
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn test_guard_prefers_string_form_and_list_accepts_any_count() {
        let mut diagnostics = Diagnostics::new();
        let attrs = AttributeAttrs::resolve(
            &attribute(vec![quoted("guard", &["HAS_X"]), raw("guards", &["A", "B"])]),
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(attrs.guards, vec!["A", "B", "HAS_X"]);

        let attrs = AttributeAttrs::resolve(&attribute(vec![raw("guards", &[])]), &mut diagnostics).unwrap();
        assert!(attrs.guards.is_empty());

        let err = AttributeAttrs::resolve(&attribute(vec![raw("guard", &[])]), &mut diagnostics).unwrap_err();
        assert_eq!(err.attribute, "guard");
    }

    #[test]
    fn test_default_and_load_as_keep_code_form() {
        let attrs = AttributeAttrs::resolve(
            &attribute(vec![quoted("default", &["abc"]), raw("load_as", &["custom_load"])]),
            &mut Diagnostics::new(),
        )
        .unwrap();
        assert_eq!(attrs.default.as_deref(), Some("\"abc\""));
        assert_eq!(attrs.load_as.as_deref(), Some("custom_load"));
    }

    #[test]
    fn test_pair_list_splits_type_and_name() {
        let mut diagnostics = Diagnostics::new();
        let attrs = InterfaceAttrs::resolve(
            &interface(vec![quoted("merge_with", &["prefer_title which", "long long  count"])]),
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(
            attrs.merge_with,
            vec![
                MergeParam::new("prefer_title", "which"),
                MergeParam::new("long long", "count")
            ]
        );

        let err = InterfaceAttrs::resolve(&interface(vec![quoted("merge_with", &["lonely"])]), &mut diagnostics)
            .unwrap_err();
        assert!(err.message.contains("'<type> <name>'"));
    }

    #[test]
    fn test_operation_and_argument_flags() {
        let op = Operation {
            name: "f".to_string(),
            return_type: Type::simple("void"),
            args: vec![],
            ext_attrs: vec![raw("static", &[]), raw("throws", &[]), raw("guards", &["G"])],
            position: Position::default(),
        };
        let attrs = OperationAttrs::resolve(&op, &mut Diagnostics::new()).unwrap();
        assert!(attrs.is_static && attrs.throws);
        assert!(!attrs.mutable && !attrs.external);
        assert_eq!(attrs.guards, vec!["G"]);

        let arg = Argument {
            name: "x".to_string(),
            type_info: Type::simple("int"),
            ext_attrs: vec![raw("out", &[]), raw("in", &[])],
            position: Position::default(),
        };
        let attrs = ArgumentAttrs::resolve(&arg, &mut Diagnostics::new()).unwrap();
        assert!(attrs.is_in && attrs.out);
    }
}
