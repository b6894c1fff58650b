//! C++ data model planning.
//!
//! For every interface the generator decides which members and methods the
//! header declares, and for the generated ones which helper implements each
//! step: `store`/`store_or_value` when saving, `load`/`load_zero`/
//! `load_or_value` or an explicit override when loading, and `merge` calls
//! with threaded merge parameters.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::LazyLock,
};

use serde::Serialize;

use crate::{
    ast::{Argument, Attribute, Definition, EnumDef, IdlModule, InterfaceDef, Operation, Type, TypeVisitor},
    diagnostics::{Diagnostics, WarningKind},
    ext_attrs::{
        ArgumentAttrs, AttributeAttrs, ENUM_SCHEMA, EmptyPolicy, InterfaceAttrs, MergeMode, MergeParam,
        OperationAttrs, SchemaViolation, SourceOfTruth,
    },
    generators::{CodeGenerator, CompileError},
    lexer::Position,
    scalars,
};

/// A scalar type with a dedicated C++ spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CppScalar {
    /// Header the spelling requires, if any.
    pub include: Option<&'static str>,
    pub spelling: &'static str,
}

const fn scalar_type(include: Option<&'static str>, spelling: &'static str) -> CppScalar {
    CppScalar { include, spelling }
}

static SIMPLE_TYPES: LazyLock<HashMap<&'static str, CppScalar>> = LazyLock::new(|| {
    HashMap::from([
        ("string", scalar_type(None, "string_type")),
        ("ascii", scalar_type(Some("<string>"), "std::string")),
        ("string_view", scalar_type(None, "string_view_type")),
        ("path", scalar_type(Some("<filesystem>"), "std::filesystem::path")),
        ("timestamp", scalar_type(Some("<date/date.h>"), "date::sys_seconds")),
        ("int8_t", scalar_type(Some("<cstdint>"), "std::int8_t")),
        ("int16_t", scalar_type(Some("<cstdint>"), "std::int16_t")),
        ("int32_t", scalar_type(Some("<cstdint>"), "std::int32_t")),
        ("int64_t", scalar_type(Some("<cstdint>"), "std::int64_t")),
        ("uint8_t", scalar_type(Some("<cstdint>"), "std::uint8_t")),
        ("uint16_t", scalar_type(Some("<cstdint>"), "std::uint16_t")),
        ("uint32_t", scalar_type(Some("<cstdint>"), "std::uint32_t")),
        ("uint64_t", scalar_type(Some("<cstdint>"), "std::uint64_t")),
        ("conv_result", scalar_type(Some("<json/serdes.hpp>"), "json::conv_result")),
        ("dict", scalar_type(Some("<json/json.hpp>"), "json::map")),
        ("str_map", scalar_type(Some("<map>"), "std::map<std::u8string, std::u8string>")),
        ("navigator", scalar_type(None, "tangle::nav::navigator")),
        ("uri", scalar_type(None, "tangle::uri")),
    ])
});

pub fn scalar(name: &str) -> Option<&'static CppScalar> {
    SIMPLE_TYPES.get(name)
}

/// Configuration settings specific to C++ planning.
#[derive(Debug, Clone)]
pub struct CppConfig {
    /// Version baked into the namespace (`v<version>`) and `VERSION` constant.
    pub version: u32,
    /// Header every generated file includes.
    pub types_header: String,
}

impl Default for CppConfig {
    fn default() -> Self {
        CppConfig {
            version: 1,
            types_header: "<widl/types.hpp>".to_string(),
        }
    }
}

// --- Context ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CppContext {
    pub version: u32,
    /// Sorted, always containing the shared types header.
    pub includes: Vec<String>,
    pub enums: Vec<CppEnum>,
    /// Every interface, in declaration order.
    pub forward_declarations: Vec<String>,
    pub interfaces: Vec<CppInterface>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CppEnum {
    pub name: String,
    /// Name of the X-macro listing the items.
    pub x_macro: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CppInterface {
    pub name: String,
    pub inheritance: Option<String>,
    pub comparison: Comparison,
    pub members: Vec<Member>,
    pub serialization: Serialization,
    /// Absent when the merge mode is `none`.
    pub merge: Option<MergePlan>,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    Equality,
    Spaceship,
}

/// The defaulted comparison operator every interface carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub kind: ComparisonKind,
    pub return_type: &'static str,
    pub operator: &'static str,
    /// Operand type, the interface by const reference.
    pub operand: String,
}

impl Comparison {
    fn new(name: &str, spaceship: bool) -> Self {
        let (kind, return_type, operator) = if spaceship {
            (ComparisonKind::Spaceship, "auto", "<=>")
        } else {
            (ComparisonKind::Equality, "bool", "==")
        };
        Comparison {
            kind,
            return_type,
            operator,
            operand: format!("{name} const&"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub name: String,
    pub cpp_type: String,
    /// Initializer literal, verbatim.
    pub default: Option<String>,
    /// Every guard must be defined for the member to exist.
    pub guards: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    Store,
    StoreOrValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreEntry {
    pub field: String,
    pub op: StoreOp,
    /// Empty values are left out of the map; only on the or-value path.
    pub omit_when_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOp {
    Load,
    LoadZero,
    LoadOrValue,
    /// Explicit loader expression from `load_as`.
    Override(String),
}

/// One step of a generated body. Steps run in order and the first failure
/// ends the body, so `PostProcess` only runs after every field succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadStep {
    Field { field: String, op: LoadOp },
    PostProcess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Serialization {
    pub source: SourceOfTruth,
    /// Bodies are generated only for map sources; node sources are hand-written.
    pub generated: bool,
    /// Declares the load post-processing hook.
    pub load_postproc: bool,
    /// Save steps, in declaration order.
    pub store: Vec<StoreEntry>,
    pub load: Vec<LoadStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeStep {
    Field { field: String, extra: Vec<String> },
    PostProcess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePlan {
    pub mode: MergeMode,
    /// Extra parameters of the `merge` signature.
    pub params: Vec<MergeParam>,
    /// Declares the merge post-processing hook.
    pub merge_postproc: bool,
    /// True only for `auto`; `manual` merges are declared but hand-written.
    pub generated: bool,
    pub steps: Vec<MergeStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Passing {
    Value,
    Reference,
    ConstReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodArg {
    pub name: String,
    pub cpp_type: String,
    pub passing: Passing,
    /// `cpp_type` with the reference qualifier applied.
    pub param_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Method {
    pub name: String,
    pub return_type: String,
    pub is_static: bool,
    pub is_const: bool,
    pub is_noexcept: bool,
    pub args: Vec<MethodArg>,
    pub guards: Vec<String>,
}

// --- Type visitors ---

/// Spells a type in C++.
struct CppTypes;

impl TypeVisitor for CppTypes {
    type Output = String;

    fn on_simple(&mut self, name: &str) -> String {
        scalar(name).map_or_else(|| name.to_string(), |info| info.spelling.to_string())
    }

    fn on_sequence(&mut self, sub: &Type) -> String {
        format!("std::vector<{}>", sub.accept(self))
    }

    fn on_optional(&mut self, sub: &Type) -> String {
        format!("std::optional<{}>", sub.accept(self))
    }

    fn on_translatable(&mut self, sub: &Type) -> String {
        format!("translatable<{}>", sub.accept(self))
    }
}

pub fn cpp_type(type_info: &Type) -> String {
    type_info.accept(&mut CppTypes)
}

/// Collects the headers a set of types needs.
struct HeaderIncludes<'a> {
    project_types: &'a HashSet<&'a str>,
    files: BTreeSet<String>,
    unknown: Vec<String>,
}

impl TypeVisitor for HeaderIncludes<'_> {
    type Output = ();

    fn on_optional(&mut self, sub: &Type) {
        sub.accept(self);
        self.files.insert("<optional>".to_string());
    }

    fn on_sequence(&mut self, sub: &Type) {
        sub.accept(self);
        self.files.insert("<vector>".to_string());
    }

    fn on_simple(&mut self, name: &str) {
        match scalar(name) {
            Some(info) => {
                if let Some(include) = info.include {
                    self.files.insert(include.to_string());
                }
            }
            None => {
                if !scalars::is_builtin(name) && !self.project_types.contains(name) {
                    self.unknown.push(name.to_string());
                }
            }
        }
    }
}

// --- Generator ---

pub struct CppGenerator {
    config: CppConfig,
}

impl Default for CppGenerator {
    fn default() -> Self {
        CppGenerator::new(None)
    }
}

impl CppGenerator {
    /// Creates a new `CppGenerator`; uses the default configuration if none is provided.
    pub fn new(config: Option<CppConfig>) -> Self {
        CppGenerator {
            config: config.unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &CppConfig {
        &self.config
    }

    fn includes(&self, module: &IdlModule, diagnostics: &mut Diagnostics) -> Vec<String> {
        let project_types: HashSet<&str> = module.definitions.iter().map(Definition::name).collect();
        let mut visitor = HeaderIncludes {
            project_types: &project_types,
            files: BTreeSet::new(),
            unknown: Vec::new(),
        };
        // Unknown names are reported at the member, argument or operation using them.
        let mut visit = |type_info: &Type, position: Position, diagnostics: &mut Diagnostics| {
            type_info.accept(&mut visitor);
            for name in visitor.unknown.drain(..) {
                diagnostics.warn(Some(position), WarningKind::UnknownType { name });
            }
        };
        for interface in module.interfaces() {
            for attribute in &interface.attributes {
                visit(&attribute.type_info, attribute.position, diagnostics);
            }
            for operation in &interface.operations {
                visit(&operation.return_type, operation.position, diagnostics);
                for arg in &operation.args {
                    visit(&arg.type_info, arg.position, diagnostics);
                }
            }
        }

        visitor.files.insert(self.config.types_header.clone());
        visitor.files.into_iter().collect()
    }

    fn plan_enum(&self, def: &EnumDef, diagnostics: &mut Diagnostics) -> Result<CppEnum, SchemaViolation> {
        ENUM_SCHEMA.resolve(&def.ext_attrs, diagnostics)?;
        Ok(CppEnum {
            name: def.name.clone(),
            x_macro: format!("{}_X", def.name.to_uppercase()),
            items: def.items.clone(),
        })
    }

    fn plan_interface(
        &self,
        def: &InterfaceDef,
        attrs: &InterfaceAttrs,
        merge_table: &HashMap<String, Vec<MergeParam>>,
        diagnostics: &mut Diagnostics,
    ) -> Result<CppInterface, SchemaViolation> {
        let fields = def
            .attributes
            .iter()
            .map(|attribute| Ok((attribute, AttributeAttrs::resolve(attribute, diagnostics)?)))
            .collect::<Result<Vec<_>, SchemaViolation>>()?;

        let members = fields
            .iter()
            .map(|(attribute, field_attrs)| Member {
                name: attribute.name.clone(),
                cpp_type: cpp_type(&attribute.type_info),
                default: field_attrs.default.clone(),
                guards: field_attrs.guards.clone(),
            })
            .collect();

        let methods = def
            .operations
            .iter()
            .map(|operation| plan_method(operation, diagnostics))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CppInterface {
            name: def.name.clone(),
            inheritance: def.inheritance.clone(),
            comparison: Comparison::new(&def.name, attrs.spaceship),
            members,
            serialization: plan_serialization(attrs, &fields),
            merge: plan_merge(attrs, &fields, merge_table),
            methods,
        })
    }
}

fn plan_serialization(attrs: &InterfaceAttrs, fields: &[(&Attribute, AttributeAttrs)]) -> Serialization {
    let generated = attrs.from == SourceOfTruth::Map;
    let mut store = Vec::new();
    let mut load = Vec::new();

    if generated {
        for (attribute, field_attrs) in fields {
            store.push(StoreEntry {
                field: attribute.name.clone(),
                op: if field_attrs.or_value {
                    StoreOp::StoreOrValue
                } else {
                    StoreOp::Store
                },
                omit_when_empty: field_attrs.or_value,
            });
            load.push(LoadStep::Field {
                field: attribute.name.clone(),
                op: load_op(field_attrs),
            });
        }
        if attrs.load_postproc {
            load.push(LoadStep::PostProcess);
        }
    }

    Serialization {
        source: attrs.from,
        generated,
        load_postproc: attrs.load_postproc,
        store,
        load,
    }
}

fn load_op(field_attrs: &AttributeAttrs) -> LoadOp {
    if let Some(load_as) = &field_attrs.load_as {
        LoadOp::Override(load_as.clone())
    } else if field_attrs.or_value {
        LoadOp::LoadOrValue
    } else if field_attrs.empty == EmptyPolicy::Allow {
        LoadOp::LoadZero
    } else {
        LoadOp::Load
    }
}

fn plan_merge(
    attrs: &InterfaceAttrs,
    fields: &[(&Attribute, AttributeAttrs)],
    merge_table: &HashMap<String, Vec<MergeParam>>,
) -> Option<MergePlan> {
    if attrs.merge == MergeMode::None {
        return None;
    }

    let generated = attrs.merge == MergeMode::Auto;
    let mut steps = Vec::new();
    if generated {
        for (attribute, field_attrs) in fields {
            let params = if field_attrs.merge_with.is_empty() {
                merge_table
                    .get(attribute.type_info.innermost())
                    .map(Vec::as_slice)
                    .unwrap_or_default()
            } else {
                field_attrs.merge_with.as_slice()
            };
            steps.push(MergeStep::Field {
                field: attribute.name.clone(),
                extra: params.iter().map(|param| param.name.clone()).collect(),
            });
        }
        if attrs.merge_postproc {
            steps.push(MergeStep::PostProcess);
        }
    }

    Some(MergePlan {
        mode: attrs.merge,
        params: attrs.merge_with.clone(),
        merge_postproc: attrs.merge_postproc,
        generated,
        steps,
    })
}

fn plan_method(operation: &Operation, diagnostics: &mut Diagnostics) -> Result<Method, SchemaViolation> {
    let attrs = OperationAttrs::resolve(operation, diagnostics)?;
    let args = operation
        .args
        .iter()
        .map(|arg| plan_argument(arg, diagnostics))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Method {
        name: operation.name.clone(),
        return_type: cpp_type(&operation.return_type),
        is_static: attrs.is_static,
        is_const: !(attrs.is_static || attrs.mutable),
        is_noexcept: !attrs.throws,
        args,
        guards: attrs.guards,
    })
}

fn plan_argument(arg: &Argument, diagnostics: &mut Diagnostics) -> Result<MethodArg, SchemaViolation> {
    let attrs = ArgumentAttrs::resolve(arg, diagnostics)?;
    let cpp_type = cpp_type(&arg.type_info);
    // `out` is checked before `in`.
    let (passing, param_type) = if attrs.out {
        (Passing::Reference, format!("{cpp_type}&"))
    } else if attrs.is_in {
        (Passing::ConstReference, format!("{cpp_type} const&"))
    } else {
        (Passing::Value, cpp_type.clone())
    };

    Ok(MethodArg {
        name: arg.name.clone(),
        cpp_type,
        passing,
        param_type,
    })
}

impl CodeGenerator for CppGenerator {
    type Context = CppContext;

    fn language(&self) -> &str {
        "cpp"
    }

    fn generate(&self, module: &IdlModule, diagnostics: &mut Diagnostics) -> Result<CppContext, CompileError> {
        // Collect pass: interface attributes and the merge parameter table.
        let mut interface_attrs: Vec<(&InterfaceDef, InterfaceAttrs)> = Vec::new();
        let mut merge_table: HashMap<String, Vec<MergeParam>> = HashMap::new();
        for def in module.interfaces() {
            let attrs = InterfaceAttrs::resolve(def, diagnostics)?;
            if !attrs.merge_with.is_empty() {
                merge_table.insert(def.name.clone(), attrs.merge_with.clone());
            }
            interface_attrs.push((def, attrs));
        }

        // Emit pass.
        let includes = self.includes(module, diagnostics);
        let enums = module
            .enums()
            .map(|def| self.plan_enum(def, diagnostics))
            .collect::<Result<Vec<_>, _>>()?;
        let interfaces = interface_attrs
            .iter()
            .map(|(def, attrs)| self.plan_interface(def, attrs, &merge_table, diagnostics))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            enums = enums.len(),
            interfaces = interfaces.len(),
            "planned {} context",
            self.language()
        );

        Ok(CppContext {
            version: self.config.version,
            includes,
            enums,
            forward_declarations: interfaces.iter().map(|i| i.name.clone()).collect(),
            interfaces,
        })
    }
}
