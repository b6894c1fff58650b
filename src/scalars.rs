//! Names of the builtin and opaque scalar types.
//!
//! A scalar never refers to a definition of the module. Backends map these
//! names to their own spellings; a backend without a mapping for one of them
//! reports it as an unknown type.

/// Opaque scalars, provided by the shared types header or a library.
static OPAQUE_TYPES: &[&str] = &[
    "string",
    "ascii",
    "string_view",
    "path",
    "timestamp",
    "int8_t",
    "int16_t",
    "int32_t",
    "int64_t",
    "uint8_t",
    "uint16_t",
    "uint32_t",
    "uint64_t",
    "conv_result",
    "dict",
    "str_map",
    "navigator",
    "uri",
];

/// Language builtins.
static BUILTIN_TYPES: &[&str] = &[
    "void",
    "int",
    "unsigned",
    "short",
    "long long",
    "char",
    "bool",
    "alpha_2_aliases",
    "object",
    "tuple",
    "list",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_TYPES.contains(&name)
}

/// True for builtin and opaque scalar names.
pub fn is_scalar(name: &str) -> bool {
    is_builtin(name) || OPAQUE_TYPES.contains(&name)
}
