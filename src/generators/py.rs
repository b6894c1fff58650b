//! Python binding planning.
//!
//! Each field, argument and return type gets a marshalling descriptor: the
//! type Python sees, the native type the binding glue spells, and whether the
//! value crosses the boundary through a proxy or by reference. Translatable
//! types additionally get synthesized wrapper classes that the IDL never
//! declares.

use std::{
    collections::{BTreeSet, HashMap},
    sync::LazyLock,
};

use serde::Serialize;

use crate::{
    ast::{Definition, EnumDef, IdlModule, InterfaceDef, Operation, Type, TypeVisitor},
    diagnostics::{Diagnostics, WarningKind},
    ext_attrs::{ArgumentAttrs, AttributeAttrs, ENUM_SCHEMA, InterfaceAttrs, OperationAttrs, SchemaViolation},
    generators::{CodeGenerator, CompileError},
    lexer::Position,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyScalar {
    pub exposed: &'static str,
    /// Native spelling when it differs from `exposed`.
    pub alias: Option<&'static str>,
    pub needs_proxy: bool,
    pub pass_by_reference: bool,
}

const fn py_scalar(
    exposed: &'static str,
    alias: Option<&'static str>,
    needs_proxy: bool,
    pass_by_reference: bool,
) -> PyScalar {
    PyScalar {
        exposed,
        alias,
        needs_proxy,
        pass_by_reference,
    }
}

static SCALARS: LazyLock<HashMap<&'static str, PyScalar>> = LazyLock::new(|| {
    HashMap::from([
        ("void", py_scalar("None", Some("void"), false, false)),
        ("timestamp", py_scalar("int", Some("date::sys_seconds"), false, false)),
        ("int", py_scalar("int", None, false, false)),
        ("unsigned", py_scalar("int", Some("unsigned"), false, false)),
        ("short", py_scalar("int", Some("short"), false, false)),
        ("long long", py_scalar("int", Some("long long"), false, false)),
        ("char", py_scalar("int", Some("char"), false, false)),
        ("int32_t", py_scalar("int", Some("int32_t"), false, false)),
        ("int64_t", py_scalar("int", Some("int64_t"), false, false)),
        ("uint32_t", py_scalar("int", Some("uint32_t"), false, false)),
        ("uint64_t", py_scalar("int", Some("uint64_t"), false, false)),
        ("bool", py_scalar("bool", None, false, false)),
        ("string", py_scalar("str", Some("string_type"), false, true)),
        ("string_view", py_scalar("str", Some("string_type"), true, true)),
        ("ascii", py_scalar("str", Some("std::string"), false, true)),
    ])
});

pub fn scalar(name: &str) -> Option<&'static PyScalar> {
    SCALARS.get(name)
}

/// How one value crosses the binding boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marshal {
    pub exposed_type: String,
    pub native_alias: String,
    pub needs_proxy: bool,
    pub pass_by_reference: bool,
}

/// Configuration settings specific to Python binding planning.
#[derive(Debug, Clone)]
pub struct PythonConfig {
    pub version: u32,
    /// Classes with this many attributes or more get no keyword constructor.
    pub max_constructor_args: usize,
}

impl Default for PythonConfig {
    fn default() -> Self {
        PythonConfig {
            version: 1,
            max_constructor_args: 15,
        }
    }
}

// --- Context ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyContext {
    pub version: u32,
    /// Names to import from `typing`, sorted.
    pub typing: Vec<String>,
    pub enums: Vec<PyEnum>,
    pub classes: Vec<PyClass>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyEnum {
    pub name: String,
    pub upper_name: String,
    pub items: Vec<String>,
}

/// A class attribute with its marshalling descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyAttribute {
    pub name: String,
    pub exposed_type: String,
    /// Absent on synthesized classes.
    pub native_alias: Option<String>,
    pub needs_proxy: bool,
    pub pass_by_reference: bool,
    /// Same guards as the native member.
    pub guards: Vec<String>,
    pub last: bool,
}

impl PyAttribute {
    fn new(name: &str, marshal: Marshal, guards: Vec<String>) -> Self {
        PyAttribute {
            name: name.to_string(),
            exposed_type: marshal.exposed_type,
            native_alias: Some(marshal.native_alias),
            needs_proxy: marshal.needs_proxy,
            pass_by_reference: marshal.pass_by_reference,
            guards,
            last: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyArgument {
    pub name: String,
    pub exposed_type: String,
    pub native_alias: Option<String>,
    pub needs_proxy: bool,
    /// Passed as a const reference by the glue.
    pub pass_by_reference: bool,
    /// The implicit `self`.
    pub receiver: bool,
    pub last: bool,
}

impl PyArgument {
    fn new(name: &str, marshal: Marshal) -> Self {
        PyArgument {
            name: name.to_string(),
            exposed_type: marshal.exposed_type,
            native_alias: Some(marshal.native_alias),
            needs_proxy: marshal.needs_proxy,
            pass_by_reference: marshal.pass_by_reference,
            receiver: false,
            last: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Instance,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyMethod {
    pub name: String,
    pub kind: MethodKind,
    pub returns: String,
    pub native_return: Option<String>,
    pub arguments: Vec<PyArgument>,
    /// The glue is written by hand: flagged `external` or an argument needs a proxy.
    pub external: bool,
    pub needs_proxy: bool,
    pub guards: Vec<String>,
}

impl PyMethod {
    /// Builds a method, prepending the receiver and marking the last argument.
    fn new(name: impl Into<String>, kind: MethodKind, returns: impl Into<String>, arguments: Vec<PyArgument>) -> Self {
        let receiver = (kind == MethodKind::Instance).then(|| PyArgument {
            name: "self".to_string(),
            exposed_type: String::new(),
            native_alias: None,
            needs_proxy: false,
            pass_by_reference: false,
            receiver: true,
            last: false,
        });
        let mut arguments: Vec<PyArgument> = receiver.into_iter().chain(arguments).collect();
        if let Some(last) = arguments.last_mut() {
            last.last = true;
        }

        PyMethod {
            name: name.into(),
            kind,
            returns: returns.into(),
            native_return: None,
            arguments,
            external: false,
            needs_proxy: false,
            guards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyClass {
    pub name: String,
    pub attributes: Vec<PyAttribute>,
    pub methods: Vec<PyMethod>,
    /// Appears as a `sequence` element somewhere in the module.
    pub is_vector: bool,
    /// Appears inside a `translatable` somewhere in the module.
    pub is_translatable: bool,
    /// Generated for a translatable; not declared in the IDL.
    pub synthetic: bool,
    pub has_constructor: bool,
}

fn synthetic_argument(name: &str, exposed_type: &str) -> PyArgument {
    PyArgument {
        name: name.to_string(),
        exposed_type: exposed_type.to_string(),
        native_alias: None,
        needs_proxy: false,
        pass_by_reference: false,
        receiver: false,
        last: false,
    }
}

// --- Type visitors ---

/// Collects typing imports and the element types of sequences and translatables.
struct TypeUsage<'a> {
    project_types: &'a HashMap<&'a str, bool>,
    typing: BTreeSet<&'static str>,
    vectors: BTreeSet<String>,
    translatables: BTreeSet<String>,
    in_vector: usize,
    in_translatable: usize,
}

impl<'a> TypeUsage<'a> {
    fn new(project_types: &'a HashMap<&'a str, bool>) -> Self {
        TypeUsage {
            project_types,
            typing: BTreeSet::new(),
            vectors: BTreeSet::new(),
            translatables: BTreeSet::new(),
            in_vector: 0,
            in_translatable: 0,
        }
    }
}

impl TypeVisitor for TypeUsage<'_> {
    type Output = ();

    fn on_optional(&mut self, sub: &Type) {
        self.typing.insert("Optional");
        sub.accept(self);
    }

    fn on_sequence(&mut self, sub: &Type) {
        self.typing.insert("List");
        self.in_vector += 1;
        sub.accept(self);
        self.in_vector -= 1;
    }

    fn on_translatable(&mut self, sub: &Type) {
        self.in_translatable += 1;
        sub.accept(self);
        self.in_translatable -= 1;
    }

    fn on_simple(&mut self, name: &str) {
        let exposed = exposed_simple(name, self.project_types);
        if self.in_vector > 0 {
            self.vectors.insert(exposed.clone());
        }
        if self.in_translatable > 0 {
            self.translatables.insert(exposed);
        }
    }
}

fn exposed_simple(name: &str, project_types: &HashMap<&str, bool>) -> String {
    if project_types.contains_key(name) {
        return name.to_string();
    }
    scalar(name).map_or_else(|| name.to_string(), |info| info.exposed.to_string())
}

/// Derives the marshalling descriptor of a type.
struct Marshaller<'a> {
    /// Project type names; `true` for interfaces, which pass by reference.
    project_types: &'a HashMap<&'a str, bool>,
    unknown: Vec<String>,
}

impl Marshaller<'_> {
    fn wrap(&mut self, sub: &Type, exposed: impl Fn(&str) -> String, native: impl Fn(&str) -> String) -> Marshal {
        let inner = sub.accept(self);
        Marshal {
            exposed_type: exposed(&inner.exposed_type),
            native_alias: native(&inner.native_alias),
            needs_proxy: inner.needs_proxy,
            pass_by_reference: true,
        }
    }
}

impl TypeVisitor for Marshaller<'_> {
    type Output = Marshal;

    fn on_simple(&mut self, name: &str) -> Marshal {
        if let Some(&is_interface) = self.project_types.get(name) {
            return Marshal {
                exposed_type: name.to_string(),
                native_alias: name.to_string(),
                needs_proxy: false,
                pass_by_reference: is_interface,
            };
        }
        match scalar(name) {
            Some(info) => Marshal {
                exposed_type: info.exposed.to_string(),
                native_alias: info.alias.unwrap_or(info.exposed).to_string(),
                needs_proxy: info.needs_proxy,
                pass_by_reference: info.pass_by_reference,
            },
            None => {
                self.unknown.push(name.to_string());
                Marshal {
                    exposed_type: name.to_string(),
                    native_alias: name.to_string(),
                    needs_proxy: false,
                    pass_by_reference: false,
                }
            }
        }
    }

    fn on_optional(&mut self, sub: &Type) -> Marshal {
        self.wrap(sub, |t| format!("Optional[{t}]"), |t| format!("std::optional<{t}>"))
    }

    fn on_sequence(&mut self, sub: &Type) -> Marshal {
        self.wrap(sub, |t| format!("List[{t}]"), |t| format!("std::vector<{t}>"))
    }

    fn on_translatable(&mut self, sub: &Type) -> Marshal {
        self.wrap(sub, |t| format!("translatable_{t}"), |t| format!("translatable<{t}>"))
    }
}

// --- Generator ---

pub struct PythonGenerator {
    config: PythonConfig,
}

impl Default for PythonGenerator {
    fn default() -> Self {
        PythonGenerator::new(None)
    }
}

/// State of one planning run.
struct Planner<'a> {
    config: &'a PythonConfig,
    project_types: &'a HashMap<&'a str, bool>,
    usage: TypeUsage<'a>,
    classes: Vec<PyClass>,
}

impl PythonGenerator {
    /// Creates a new `PythonGenerator`; uses the default configuration if none is provided.
    pub fn new(config: Option<PythonConfig>) -> Self {
        PythonGenerator {
            config: config.unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &PythonConfig {
        &self.config
    }
}

impl Planner<'_> {
    fn marshal(&self, type_info: &Type, position: Position, diagnostics: &mut Diagnostics) -> Marshal {
        let mut marshaller = Marshaller {
            project_types: self.project_types,
            unknown: Vec::new(),
        };
        let marshal = type_info.accept(&mut marshaller);
        for name in marshaller.unknown {
            diagnostics.warn(Some(position), WarningKind::UnknownType { name });
        }
        marshal
    }

    fn plan_enum(&self, def: &EnumDef, diagnostics: &mut Diagnostics) -> Result<PyEnum, SchemaViolation> {
        ENUM_SCHEMA.resolve(&def.ext_attrs, diagnostics)?;
        Ok(PyEnum {
            name: def.name.clone(),
            upper_name: def.name.to_uppercase(),
            items: def.items.clone(),
        })
    }

    fn plan_method(&self, operation: &Operation, diagnostics: &mut Diagnostics) -> Result<PyMethod, SchemaViolation> {
        let attrs = OperationAttrs::resolve(operation, diagnostics)?;

        let mut arguments = Vec::with_capacity(operation.args.len());
        for arg in &operation.args {
            ArgumentAttrs::resolve(arg, diagnostics)?;
            let marshal = self.marshal(&arg.type_info, arg.position, diagnostics);
            arguments.push(PyArgument::new(&arg.name, marshal));
        }
        let needs_proxy = arguments.iter().any(|arg| arg.needs_proxy);

        let kind = if attrs.is_static {
            MethodKind::Static
        } else {
            MethodKind::Instance
        };
        let returns = self.marshal(&operation.return_type, operation.position, diagnostics);
        let mut method = PyMethod::new(&operation.name, kind, returns.exposed_type, arguments);
        method.native_return = Some(returns.native_alias);
        method.external = attrs.external || needs_proxy;
        method.needs_proxy = needs_proxy;
        method.guards = attrs.guards;
        Ok(method)
    }

    fn plan_interface(&mut self, def: &InterfaceDef, diagnostics: &mut Diagnostics) -> Result<(), SchemaViolation> {
        // Nothing in the binding depends on interface attributes, but they are still validated.
        InterfaceAttrs::resolve(def, diagnostics)?;

        let mut attributes = def
            .attributes
            .iter()
            .map(|attribute| {
                let attrs = AttributeAttrs::resolve(attribute, diagnostics)?;
                let marshal = self.marshal(&attribute.type_info, attribute.position, diagnostics);
                Ok(PyAttribute::new(&attribute.name, marshal, attrs.guards))
            })
            .collect::<Result<Vec<_>, SchemaViolation>>()?;
        if let Some(last) = attributes.last_mut() {
            last.last = true;
        }

        let methods = def
            .operations
            .iter()
            .map(|operation| self.plan_method(operation, diagnostics))
            .collect::<Result<Vec<_>, _>>()?;

        let is_translatable = self.usage.translatables.contains(&def.name);
        let has_constructor = attributes.len() < self.config.max_constructor_args;
        self.classes.push(PyClass {
            name: def.name.clone(),
            attributes,
            methods,
            is_vector: self.usage.vectors.contains(&def.name),
            is_translatable,
            synthetic: false,
            has_constructor,
        });

        if is_translatable {
            self.add_translatable(&def.name);
        }
        Ok(())
    }

    /// Adds `translatable_<name>` with its backing map and map entry classes.
    fn add_translatable(&mut self, name: &str) {
        let items = format!("translatable_{name}_items");
        self.add_map_indexing_suite(&items, "str", name);

        let items_attribute = PyAttribute {
            name: "items".to_string(),
            exposed_type: items,
            native_alias: None,
            needs_proxy: false,
            pass_by_reference: false,
            guards: Vec::new(),
            last: true,
        };
        self.classes.push(synthetic_class(
            format!("translatable_{name}"),
            vec![items_attribute],
            vec![
                PyMethod::new(
                    "find",
                    MethodKind::Instance,
                    name,
                    vec![synthetic_argument("index", "str")],
                ),
                PyMethod::new(
                    "update",
                    MethodKind::Instance,
                    "bool",
                    vec![synthetic_argument("index", "str"), synthetic_argument("value", name)],
                ),
            ],
        ));
    }

    fn add_map_indexing_suite(&mut self, name: &str, key: &str, value: &str) {
        self.classes.push(synthetic_class(
            format!("map_indexing_suite_{name}_entry"),
            vec![],
            vec![
                PyMethod::new("data", MethodKind::Instance, value, vec![]),
                PyMethod::new("key", MethodKind::Instance, key, vec![]),
            ],
        ));

        let index = || synthetic_argument("index", key);
        self.classes.push(synthetic_class(
            name.to_string(),
            vec![],
            vec![
                PyMethod::new("__contains__", MethodKind::Instance, "bool", vec![index()]),
                PyMethod::new("__delitem__", MethodKind::Instance, "None", vec![index()]),
                PyMethod::new("__getitem__", MethodKind::Instance, value, vec![index()]),
                PyMethod::new(
                    "__setitem__",
                    MethodKind::Instance,
                    "None",
                    vec![index(), synthetic_argument("object", value)],
                ),
                PyMethod::new("__iter__", MethodKind::Instance, "", vec![]),
                PyMethod::new("__len__", MethodKind::Instance, "int", vec![]),
            ],
        ));
    }
}

fn synthetic_class(name: String, attributes: Vec<PyAttribute>, methods: Vec<PyMethod>) -> PyClass {
    PyClass {
        name,
        attributes,
        methods,
        is_vector: false,
        is_translatable: false,
        synthetic: true,
        has_constructor: false,
    }
}

impl CodeGenerator for PythonGenerator {
    type Context = PyContext;

    fn language(&self) -> &str {
        "python"
    }

    fn generate(&self, module: &IdlModule, diagnostics: &mut Diagnostics) -> Result<PyContext, CompileError> {
        let project_types: HashMap<&str, bool> = module
            .definitions
            .iter()
            .map(|def| (def.name(), matches!(def, Definition::Interface(_))))
            .collect();

        let mut usage = TypeUsage::new(&project_types);
        for interface in module.interfaces() {
            interface.visit_all_types(&mut usage);
        }
        if module.enums().next().is_some() {
            usage.typing.insert("ClassVar");
        }
        let typing = usage.typing.iter().map(|name| name.to_string()).collect();

        let mut planner = Planner {
            config: &self.config,
            project_types: &project_types,
            usage,
            classes: Vec::new(),
        };
        planner.add_translatable("str");

        let mut enums = Vec::new();
        for def in &module.definitions {
            match def {
                Definition::Enum(def) => enums.push(planner.plan_enum(def, diagnostics)?),
                Definition::Interface(def) => planner.plan_interface(def, diagnostics)?,
            }
        }

        // Translatable scalars other than `str`, and enums, have no interface to follow.
        let remaining: Vec<String> = planner
            .usage
            .translatables
            .iter()
            .filter(|name| name.as_str() != "str" && project_types.get(name.as_str()) != Some(&true))
            .cloned()
            .collect();
        for name in remaining {
            planner.add_translatable(&name);
        }

        tracing::debug!(
            enums = enums.len(),
            classes = planner.classes.len(),
            "planned {} context",
            self.language()
        );

        Ok(PyContext {
            version: self.config.version,
            typing,
            enums,
            classes: planner.classes,
        })
    }
}
