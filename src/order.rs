//! Declaration order of top-level definitions.
//!
//! An interface depends on its parent and on the innermost named type of each
//! attribute, counting only names defined in the same module. Enums depend on
//! nothing. The order is built from batches: every definition without
//! outstanding dependencies joins the current batch, the batch is sorted by
//! name and removed from the graph, and the process repeats. Whatever is left
//! once no definition is free belongs to a cycle and is appended in name
//! order, which may place a type after a member that needs it.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use thiserror::Error;

use crate::{
    ast::{Definition, IdlModule, TypeVisitor},
    diagnostics::{Diagnostics, WarningKind},
    lexer::Position,
    scalars::is_scalar,
};

/// Two definitions share a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} already exists, found second definition at position {position}")]
pub struct DuplicateDefinition {
    pub name: String,
    /// Position of the second definition.
    pub position: Position,
}

/// Result of the batch extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationOrder {
    /// Names in dependency order.
    pub resolved: Vec<String>,
    /// Names left in a cycle, sorted.
    pub cyclic: Vec<String>,
}

impl DeclarationOrder {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolved.iter().chain(&self.cyclic).map(String::as_str)
    }
}

struct References<'a> {
    known: &'a HashSet<&'a str>,
    current: &'a str,
    refs: BTreeSet<String>,
}

impl TypeVisitor for References<'_> {
    type Output = ();

    fn on_simple(&mut self, name: &str) {
        if name != self.current && !is_scalar(name) && self.known.contains(name) {
            self.refs.insert(name.to_string());
        }
    }
}

/// Maps every definition name to the module names it references.
///
/// Self references are dropped; a member of the enclosing type's own kind
/// does not constrain the order.
pub fn dependencies(definitions: &[Definition]) -> IndexMap<String, BTreeSet<String>> {
    let known: HashSet<&str> = definitions.iter().map(Definition::name).collect();

    definitions
        .iter()
        .map(|def| {
            let mut visitor = References {
                known: &known,
                current: def.name(),
                refs: BTreeSet::new(),
            };
            if let Definition::Interface(interface) = def {
                if let Some(parent) = &interface.inheritance {
                    visitor.on_simple(parent);
                }
                for attribute in &interface.attributes {
                    attribute.type_info.accept(&mut visitor);
                }
            }
            (def.name().to_string(), visitor.refs)
        })
        .collect()
}

/// Computes the declaration order without touching the definitions.
///
/// Names must be unique; [`reorder`] checks this before calling here.
pub fn declaration_order(definitions: &[Definition]) -> DeclarationOrder {
    let mut refs = dependencies(definitions);
    let mut resolved = Vec::with_capacity(refs.len());

    while !refs.is_empty() {
        let mut batch: Vec<String> = refs
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        if batch.is_empty() {
            break;
        }

        for name in &batch {
            refs.shift_remove(name);
        }
        for deps in refs.values_mut() {
            for name in &batch {
                deps.remove(name);
            }
        }

        batch.sort();
        resolved.extend(batch);
    }

    let mut cyclic: Vec<String> = refs.into_keys().collect();
    cyclic.sort();

    DeclarationOrder { resolved, cyclic }
}

/// Reorders the module's definitions into declaration order.
///
/// A residual cycle is reported as a warning and does not stop generation.
/// Two definitions with the same name are an error.
pub fn reorder(module: IdlModule, diagnostics: &mut Diagnostics) -> Result<IdlModule, DuplicateDefinition> {
    let mut seen = HashSet::new();
    if let Some(def) = module.definitions.iter().find(|def| !seen.insert(def.name())) {
        return Err(DuplicateDefinition {
            name: def.name().to_string(),
            position: def.position(),
        });
    }

    let order = declaration_order(&module.definitions);
    if !order.cyclic.is_empty() {
        diagnostics.warn(
            None,
            WarningKind::CycleDetected {
                names: order.cyclic.clone(),
            },
        );
    }

    let mut by_name: HashMap<String, Definition> = module
        .definitions
        .into_iter()
        .map(|def| (def.name().to_string(), def))
        .collect();
    let definitions = order.names().filter_map(|name| by_name.remove(name)).collect();

    tracing::debug!(order = ?order.resolved, cyclic = ?order.cyclic, "linearized definitions");
    Ok(IdlModule { definitions })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        ast::{Attribute, EnumDef, InterfaceDef, Type},
        lexer::Position,
    };

    fn interface(name: &str, parent: Option<&str>, members: &[Type]) -> Definition {
        Definition::Interface(InterfaceDef {
            name: name.to_string(),
            inheritance: parent.map(str::to_string),
            attributes: members
                .iter()
                .enumerate()
                .map(|(index, type_info)| Attribute {
                    name: format!("m{index}"),
                    type_info: type_info.clone(),
                    ext_attrs: vec![],
                    position: Position::default(),
                })
                .collect(),
            operations: vec![],
            ext_attrs: vec![],
            position: Position::default(),
        })
    }

    fn enumeration(name: &str) -> Definition {
        Definition::Enum(EnumDef {
            name: name.to_string(),
            items: vec!["X".to_string()],
            ext_attrs: vec![],
            position: Position::default(),
        })
    }

    fn names(order: &DeclarationOrder) -> Vec<&str> {
        order.names().collect()
    }

    #[test]
    fn test_dependencies_follow_innermost_module_types() {
        let defs = vec![
            interface(
                "Movie",
                Some("Base"),
                &[
                    Type::sequence(Type::optional(Type::simple("Person"))),
                    Type::translatable(Type::simple("string")),
                    Type::simple("Unknown"),
                    Type::sequence(Type::simple("Movie")),
                ],
            ),
            interface("Person", None, &[]),
            interface("Base", None, &[]),
        ];
        let deps = dependencies(&defs);
        let movie: Vec<&str> = deps["Movie"].iter().map(String::as_str).collect();
        assert_eq!(movie, vec!["Base", "Person"]);
        assert!(deps["Person"].is_empty());
    }

    #[test]
    fn test_batches_are_sorted() {
        let defs = vec![
            interface("Zed", None, &[Type::simple("Color")]),
            interface("Alpha", None, &[Type::simple("Zed")]),
            enumeration("Color"),
            enumeration("Blend"),
        ];
        let order = declaration_order(&defs);
        assert_eq!(names(&order), vec!["Blend", "Color", "Zed", "Alpha"]);
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_mutual_reference_falls_back_to_alphabetical() {
        let defs = vec![
            interface("B", None, &[Type::simple("A")]),
            interface("A", None, &[Type::simple("B")]),
        ];
        let order = declaration_order(&defs);
        assert!(order.resolved.is_empty());
        assert_eq!(order.cyclic, vec!["A", "B"]);
    }

    #[test]
    fn test_cycle_members_come_after_resolved_batches() {
        let defs = vec![
            interface("Cyc2", None, &[Type::simple("Cyc1")]),
            interface("Cyc1", None, &[Type::simple("Cyc2"), Type::simple("Leaf")]),
            interface("Leaf", None, &[]),
            interface("Tail", None, &[Type::simple("Cyc1")]),
        ];
        let order = declaration_order(&defs);
        assert_eq!(order.resolved, vec!["Leaf"]);
        assert_eq!(order.cyclic, vec!["Cyc1", "Cyc2", "Tail"]);
    }

    #[test]
    fn test_reorder_moves_definitions_and_warns_on_cycles() {
        let module = IdlModule::new(vec![
            interface("B", None, &[Type::simple("A")]),
            interface("A", None, &[Type::simple("B")]),
            enumeration("E"),
        ]);
        let mut diagnostics = Diagnostics::new();
        let module = reorder(module, &mut diagnostics).unwrap();
        let order: Vec<&str> = module.definitions.iter().map(Definition::name).collect();
        assert_eq!(order, vec!["E", "A", "B"]);
        assert_eq!(
            diagnostics.warnings()[0].kind,
            WarningKind::CycleDetected {
                names: vec!["A".to_string(), "B".to_string()]
            }
        );
    }

    #[test]
    fn test_reorder_rejects_duplicate_names() {
        let module = IdlModule::new(vec![
            enumeration("E"),
            interface("A", None, &[]),
            enumeration("E"),
        ]);
        let mut diagnostics = Diagnostics::new();
        let err = reorder(module, &mut diagnostics).unwrap_err();
        assert_eq!(err.name, "E");
        assert!(err.to_string().contains("already exists"));
        assert!(diagnostics.is_empty());
    }

    /// Builds eight interfaces where `T{a}` may reference `T{b}` only for `b < a`.
    fn acyclic(edges: &[(usize, usize)], rotate: usize) -> Vec<Definition> {
        let mut defs: Vec<Definition> = (0..8)
            .map(|a| {
                let members: Vec<Type> = edges
                    .iter()
                    .filter(|(from, to)| *from == a && to < from)
                    .map(|(_, to)| Type::optional(Type::simple(format!("T{to}"))))
                    .collect();
                interface(&format!("T{a}"), None, &members)
            })
            .collect();
        defs.rotate_left(rotate);
        defs
    }

    proptest! {
        #[test]
        fn prop_order_is_deterministic(
            edges in proptest::collection::vec((0usize..8, 0usize..8), 0..24),
            rotate in 0usize..8,
        ) {
            let defs = acyclic(&edges, rotate);
            prop_assert_eq!(declaration_order(&defs), declaration_order(&defs));
            // Sorted batches make the result independent of input order.
            prop_assert_eq!(declaration_order(&defs), declaration_order(&acyclic(&edges, 0)));
        }

        #[test]
        fn prop_acyclic_order_is_topological(
            edges in proptest::collection::vec((0usize..8, 0usize..8), 0..24),
            rotate in 0usize..8,
        ) {
            let order = declaration_order(&acyclic(&edges, rotate));
            prop_assert!(order.cyclic.is_empty());
            let position: HashMap<&str, usize> =
                order.names().enumerate().map(|(index, name)| (name, index)).collect();
            for (from, to) in edges.iter().filter(|(from, to)| to < from) {
                let from = format!("T{from}");
                let to = format!("T{to}");
                prop_assert!(position[to.as_str()] < position[from.as_str()]);
            }
        }
    }
}
