//! Index-overlay AST storage.
//!
//! This module provides the [`NodeArena`] coordinator that stores every parsed
//! node as a fixed-size record in a contiguous vector, addressed by
//! [`NodeIndex`] rather than by pointer, with:
//! - Geometric (doubling) growth capped by [`crate::limits::SecurityLimits::max_arena_capacity`]
//! - A sparse sidecar map for the minority of nodes carrying structured payload
//! - Typed allocation helpers that allocate a record and its attribute atomically

use std::collections::HashMap;

use thiserror::Error;

/// A handle into a [`NodeArena`]. Meaningless across different arenas.
///
/// The sentinel [`NodeIndex::NULL`] represents "no node" (e.g. a compilation
/// unit with no package declaration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(i32);

impl NodeIndex {
    /// Sentinel value meaning "no node".
    pub const NULL: NodeIndex = NodeIndex(-1);

    fn new(value: usize) -> Self {
        NodeIndex(value as i32)
    }

    /// `true` unless this is [`NodeIndex::NULL`].
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    /// The raw index value, or `None` for [`NodeIndex::NULL`].
    pub fn value(&self) -> Option<usize> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

/// A closed set of Java AST node kinds.
///
/// Ordinals are stable within a process run (they are stored in the arena
/// record) but are not guaranteed stable across crate versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NodeType {
    CompilationUnit = 0,
    PackageDeclaration = 1,
    ImportDeclaration = 2,
    /// JEP 511 module-import declaration (`import module foo;`).
    ModuleImportDeclaration = 3,
    /// JEP 512 implicit (unnamed) class declaration.
    ImplicitClassDeclaration = 4,
    ClassDeclaration = 5,
    InterfaceDeclaration = 6,
    EnumDeclaration = 7,
    RecordDeclaration = 8,
    AnnotationTypeDeclaration = 9,
    FieldDeclaration = 10,
    MethodDeclaration = 11,
    ConstructorDeclaration = 12,
    ParameterDeclaration = 13,
    Block = 14,
    ExpressionStatement = 15,
    IfStatement = 16,
    ForStatement = 17,
    WhileStatement = 18,
    ReturnStatement = 19,
    Identifier = 20,
    Literal = 21,
    BinaryExpression = 22,
    FieldAccessExpression = 23,
    MethodInvocationExpression = 24,
    /// Java module descriptor (`module-info.java`'s `module` declaration).
    ModuleDeclaration = 25,
    RequiresDirective = 26,
    ExportsDirective = 27,
    OpensDirective = 28,
}

impl NodeType {
    fn allows_import_attribute(self) -> bool {
        matches!(self, NodeType::ImportDeclaration)
    }

    fn allows_module_import_attribute(self) -> bool {
        matches!(self, NodeType::ModuleImportDeclaration)
    }

    fn allows_package_attribute(self) -> bool {
        matches!(self, NodeType::PackageDeclaration)
    }

    fn allows_type_declaration_attribute(self) -> bool {
        matches!(
            self,
            NodeType::ClassDeclaration
                | NodeType::InterfaceDeclaration
                | NodeType::EnumDeclaration
                | NodeType::RecordDeclaration
                | NodeType::AnnotationTypeDeclaration
                | NodeType::ImplicitClassDeclaration
        )
    }

    fn allows_parameter_attribute(self) -> bool {
        matches!(self, NodeType::ParameterDeclaration)
    }

    fn allows_module_declaration_attribute(self) -> bool {
        matches!(self, NodeType::ModuleDeclaration)
    }

    fn allows_requires_attribute(self) -> bool {
        matches!(self, NodeType::RequiresDirective)
    }

    fn allows_exports_or_opens_attribute(self) -> bool {
        matches!(self, NodeType::ExportsDirective | NodeType::OpensDirective)
    }
}

/// Sparse payload attached to declaration nodes.
///
/// Each variant's fields are non-empty where typed as `String`; see the
/// per-variant constructors for the validation this enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAttribute {
    Import { qualified_name: String, is_static: bool },
    ModuleImport { module_name: String },
    Package { name: String },
    TypeDeclaration { name: String, modifiers: TypeModifiers },
    Parameter { name: String, is_varargs: bool, is_final: bool, is_receiver: bool },
    ModuleDeclaration { name: String, is_open: bool },
    RequiresDirective { module: String, is_transitive: bool, is_static: bool },
    ExportsDirective { package: String, target_modules: Vec<String> },
    OpensDirective { package: String, target_modules: Vec<String> },
}

/// Modifier flags carried alongside a type declaration's name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeModifiers {
    pub is_public: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeRecord {
    node_type: NodeType,
    start: u32,
    end: u32,
}

/// Errors raised by [`NodeArena`] operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArenaError {
    #[error("arena capacity exceeded: cannot grow past {max} nodes")]
    CapacityExceeded { max: usize },

    #[error("invalid byte range: start {start} must be <= end {end}")]
    InvalidRange { start: i64, end: i64 },

    #[error("node index {0:?} out of bounds")]
    IndexOutOfBounds(NodeIndex),

    #[error("node {index:?} of type {node_type:?} does not carry a {expected} attribute")]
    AttributeTypeMismatch { index: NodeIndex, node_type: NodeType, expected: &'static str },

    #[error("node {index:?} has no attribute attached")]
    MissingAttribute { index: NodeIndex },

    #[error("attribute field '{field}' must not be empty")]
    EmptyAttributeField { field: &'static str },
}

/// Contiguous, index-overlay storage for AST nodes plus a sparse attribute
/// sidecar.
///
/// # Invariants
///
/// - `start <= end` for every allocated node.
/// - `node_count()` increases by exactly one per successful [`NodeArena::allocate`].
/// - Growth doubles capacity but never exceeds `max_capacity`.
/// - Attribute access on the wrong node type always fails.
#[derive(Debug)]
pub struct NodeArena {
    records: Vec<NodeRecord>,
    attributes: HashMap<NodeIndex, NodeAttribute>,
    max_capacity: usize,
}

impl PartialEq for NodeArena {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records && self.attributes == other.attributes
    }
}
impl Eq for NodeArena {}

impl NodeArena {
    /// Creates an arena that reserves `initial_capacity` records up front and
    /// refuses to grow past `max_capacity` nodes.
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Self {
        NodeArena {
            records: Vec::with_capacity(initial_capacity.min(max_capacity)),
            attributes: HashMap::new(),
            max_capacity,
        }
    }

    /// Number of nodes currently stored.
    pub fn node_count(&self) -> usize {
        self.records.len()
    }

    /// Current backing capacity, in nodes (not bytes).
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Approximate memory usage in bytes: 12 bytes per record plus a rough
    /// per-entry estimate for the attribute sidecar.
    pub fn memory_usage(&self) -> usize {
        self.records.len() * 12 + self.attributes.len() * std::mem::size_of::<NodeAttribute>()
    }

    /// Allocates a bare node with no attribute.
    pub fn allocate(&mut self, node_type: NodeType, start: u32, end: u32) -> Result<NodeIndex, ArenaError> {
        if start > end {
            return Err(ArenaError::InvalidRange { start: start as i64, end: end as i64 });
        }
        if self.records.len() >= self.max_capacity {
            return Err(ArenaError::CapacityExceeded { max: self.max_capacity });
        }
        // Geometric growth: once we hit the Vec's current capacity, double it
        // (capped by max_capacity) rather than letting Vec pick its own factor,
        // so `capacity()` tracks the doubling schedule exactly.
        if self.records.len() == self.records.capacity() {
            let doubled = (self.records.capacity().max(1) * 2).min(self.max_capacity);
            self.records.reserve(doubled.saturating_sub(self.records.len()));
        }
        let index = NodeIndex::new(self.records.len());
        self.records.push(NodeRecord { node_type, start, end });
        Ok(index)
    }

    fn allocate_with_attribute(
        &mut self,
        node_type: NodeType,
        start: u32,
        end: u32,
        attribute: NodeAttribute,
    ) -> Result<NodeIndex, ArenaError> {
        let index = self.allocate(node_type, start, end)?;
        self.attributes.insert(index, attribute);
        Ok(index)
    }

    /// Allocates an import-declaration node together with its [`NodeAttribute::Import`].
    pub fn allocate_import(
        &mut self,
        start: u32,
        end: u32,
        qualified_name: String,
        is_static: bool,
    ) -> Result<NodeIndex, ArenaError> {
        if qualified_name.is_empty() {
            return Err(ArenaError::EmptyAttributeField { field: "qualified_name" });
        }
        self.allocate_with_attribute(
            NodeType::ImportDeclaration,
            start,
            end,
            NodeAttribute::Import { qualified_name, is_static },
        )
    }

    /// Allocates a JEP 511 module-import node together with its [`NodeAttribute::ModuleImport`].
    pub fn allocate_module_import(&mut self, start: u32, end: u32, module_name: String) -> Result<NodeIndex, ArenaError> {
        if module_name.is_empty() {
            return Err(ArenaError::EmptyAttributeField { field: "module_name" });
        }
        self.allocate_with_attribute(NodeType::ModuleImportDeclaration, start, end, NodeAttribute::ModuleImport { module_name })
    }

    /// Allocates a package-declaration node together with its [`NodeAttribute::Package`].
    pub fn allocate_package(&mut self, start: u32, end: u32, name: String) -> Result<NodeIndex, ArenaError> {
        if name.is_empty() {
            return Err(ArenaError::EmptyAttributeField { field: "name" });
        }
        self.allocate_with_attribute(NodeType::PackageDeclaration, start, end, NodeAttribute::Package { name })
    }

    /// Allocates a type-declaration node (class/interface/enum/record/annotation-type/implicit
    /// class) together with its [`NodeAttribute::TypeDeclaration`].
    pub fn allocate_type_declaration(
        &mut self,
        node_type: NodeType,
        start: u32,
        end: u32,
        name: String,
        modifiers: TypeModifiers,
    ) -> Result<NodeIndex, ArenaError> {
        if !node_type.allows_type_declaration_attribute() {
            return Err(ArenaError::AttributeTypeMismatch {
                index: NodeIndex::NULL,
                node_type,
                expected: "TypeDeclaration",
            });
        }
        if name.is_empty() {
            return Err(ArenaError::EmptyAttributeField { field: "name" });
        }
        self.allocate_with_attribute(node_type, start, end, NodeAttribute::TypeDeclaration { name, modifiers })
    }

    /// Allocates a parameter-declaration node together with its [`NodeAttribute::Parameter`].
    pub fn allocate_parameter(
        &mut self,
        start: u32,
        end: u32,
        name: String,
        is_varargs: bool,
        is_final: bool,
        is_receiver: bool,
    ) -> Result<NodeIndex, ArenaError> {
        if name.is_empty() {
            return Err(ArenaError::EmptyAttributeField { field: "name" });
        }
        self.allocate_with_attribute(
            NodeType::ParameterDeclaration,
            start,
            end,
            NodeAttribute::Parameter { name, is_varargs, is_final, is_receiver },
        )
    }

    fn check_index(&self, index: NodeIndex) -> Result<usize, ArenaError> {
        match index.value() {
            Some(v) if v < self.records.len() => Ok(v),
            _ => Err(ArenaError::IndexOutOfBounds(index)),
        }
    }

    /// The node's type.
    pub fn get_type(&self, index: NodeIndex) -> Result<NodeType, ArenaError> {
        let i = self.check_index(index)?;
        Ok(self.records[i].node_type)
    }

    /// The node's start byte offset.
    pub fn get_start(&self, index: NodeIndex) -> Result<u32, ArenaError> {
        let i = self.check_index(index)?;
        Ok(self.records[i].start)
    }

    /// The node's end byte offset.
    pub fn get_end(&self, index: NodeIndex) -> Result<u32, ArenaError> {
        let i = self.check_index(index)?;
        Ok(self.records[i].end)
    }

    /// Iterates every allocated node index in allocation order.
    pub fn iter_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (0..self.records.len()).map(NodeIndex::new)
    }

    fn get_attribute(&self, index: NodeIndex) -> Result<&NodeAttribute, ArenaError> {
        self.check_index(index)?;
        self.attributes.get(&index).ok_or(ArenaError::MissingAttribute { index })
    }

    /// Reads the [`NodeAttribute::Import`] attribute of an import-declaration node.
    pub fn get_import_attribute(&self, index: NodeIndex) -> Result<(&str, bool), ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_import_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "Import" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::Import { qualified_name, is_static } => Ok((qualified_name.as_str(), *is_static)),
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "Import" }),
        }
    }

    /// Reads the [`NodeAttribute::ModuleImport`] attribute of a module-import node.
    pub fn get_module_import_attribute(&self, index: NodeIndex) -> Result<&str, ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_module_import_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "ModuleImport" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::ModuleImport { module_name } => Ok(module_name.as_str()),
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "ModuleImport" }),
        }
    }

    /// Reads the [`NodeAttribute::Package`] attribute of a package-declaration node.
    pub fn get_package_attribute(&self, index: NodeIndex) -> Result<&str, ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_package_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "Package" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::Package { name } => Ok(name.as_str()),
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "Package" }),
        }
    }

    /// Reads the [`NodeAttribute::TypeDeclaration`] attribute of any of the six type-declaration
    /// node kinds.
    pub fn get_type_declaration_attribute(&self, index: NodeIndex) -> Result<(&str, TypeModifiers), ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_type_declaration_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "TypeDeclaration" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::TypeDeclaration { name, modifiers } => Ok((name.as_str(), *modifiers)),
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "TypeDeclaration" }),
        }
    }

    /// Reads the [`NodeAttribute::Parameter`] attribute of a parameter-declaration node.
    pub fn get_parameter_attribute(&self, index: NodeIndex) -> Result<(&str, bool, bool, bool), ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_parameter_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "Parameter" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::Parameter { name, is_varargs, is_final, is_receiver } => {
                Ok((name.as_str(), *is_varargs, *is_final, *is_receiver))
            }
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "Parameter" }),
        }
    }

    /// Reads the [`NodeAttribute::ModuleDeclaration`] attribute of a `module` declaration node.
    pub fn get_module_declaration_attribute(&self, index: NodeIndex) -> Result<(&str, bool), ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_module_declaration_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "ModuleDeclaration" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::ModuleDeclaration { name, is_open } => Ok((name.as_str(), *is_open)),
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "ModuleDeclaration" }),
        }
    }

    /// Reads the [`NodeAttribute::RequiresDirective`] attribute of a `requires` directive node.
    pub fn get_requires_attribute(&self, index: NodeIndex) -> Result<(&str, bool, bool), ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_requires_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "RequiresDirective" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::RequiresDirective { module, is_transitive, is_static } => {
                Ok((module.as_str(), *is_transitive, *is_static))
            }
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "RequiresDirective" }),
        }
    }

    /// Reads the [`NodeAttribute::ExportsDirective`]/[`NodeAttribute::OpensDirective`] attribute
    /// of an `exports`/`opens` directive node.
    pub fn get_exports_or_opens_attribute(&self, index: NodeIndex) -> Result<(&str, &[String]), ArenaError> {
        let node_type = self.get_type(index)?;
        if !node_type.allows_exports_or_opens_attribute() {
            return Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "ExportsDirective/OpensDirective" });
        }
        match self.get_attribute(index)? {
            NodeAttribute::ExportsDirective { package, target_modules } | NodeAttribute::OpensDirective { package, target_modules } => {
                Ok((package.as_str(), target_modules.as_slice()))
            }
            _ => Err(ArenaError::AttributeTypeMismatch { index, node_type, expected: "ExportsDirective/OpensDirective" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_sequential_indices_and_round_trips_ranges() {
        let mut arena = NodeArena::new(4, 100);
        let a = arena.allocate(NodeType::CompilationUnit, 0, 10).unwrap();
        let b = arena.allocate(NodeType::PackageDeclaration, 0, 9).unwrap();

        assert_eq!(arena.get_start(a).unwrap(), 0);
        assert_eq!(arena.get_end(a).unwrap(), 10);
        assert_eq!(arena.get_start(b).unwrap(), 0);
        assert_eq!(arena.get_end(b).unwrap(), 9);
        assert_eq!(arena.node_count(), 2);
    }

    #[test]
    fn node_count_increments_by_one_per_allocation() {
        let mut arena = NodeArena::new(1, 100);
        for i in 0..10 {
            arena.allocate(NodeType::Identifier, i, i + 1).unwrap();
        }
        assert_eq!(arena.node_count(), 10);
    }

    #[test]
    fn allocate_past_capacity_fails_and_does_not_increment_count() {
        let mut arena = NodeArena::new(1, 3);
        arena.allocate(NodeType::Identifier, 0, 1).unwrap();
        arena.allocate(NodeType::Identifier, 0, 1).unwrap();
        arena.allocate(NodeType::Identifier, 0, 1).unwrap();
        let before = arena.node_count();
        let err = arena.allocate(NodeType::Identifier, 0, 1).unwrap_err();
        assert_eq!(err, ArenaError::CapacityExceeded { max: 3 });
        assert_eq!(arena.node_count(), before);
    }

    #[test]
    fn invalid_range_is_rejected() {
        let mut arena = NodeArena::new(1, 10);
        let err = arena.allocate(NodeType::Identifier, 5, 2).unwrap_err();
        assert_eq!(err, ArenaError::InvalidRange { start: 5, end: 2 });
    }

    #[test]
    fn get_on_out_of_bounds_index_fails() {
        let arena = NodeArena::new(1, 10);
        let err = arena.get_type(NodeIndex::new(0)).unwrap_err();
        assert_eq!(err, ArenaError::IndexOutOfBounds(NodeIndex::new(0)));
    }

    #[test]
    fn wrong_attribute_getter_always_fails() {
        let mut arena = NodeArena::new(1, 10);
        let id = arena.allocate(NodeType::Identifier, 0, 1).unwrap();
        let err = arena.get_import_attribute(id).unwrap_err();
        assert!(matches!(err, ArenaError::AttributeTypeMismatch { expected: "Import", .. }));
    }

    #[test]
    fn correct_attribute_getter_returns_supplied_value() {
        let mut arena = NodeArena::new(1, 10);
        let idx = arena.allocate_import(0, 20, "java.util.List".to_string(), false).unwrap();
        let (name, is_static) = arena.get_import_attribute(idx).unwrap();
        assert_eq!(name, "java.util.List");
        assert!(!is_static);
    }

    #[test]
    fn type_declaration_attribute_accepts_all_six_variants() {
        let mut arena = NodeArena::new(8, 100);
        for node_type in [
            NodeType::ClassDeclaration,
            NodeType::InterfaceDeclaration,
            NodeType::EnumDeclaration,
            NodeType::RecordDeclaration,
            NodeType::AnnotationTypeDeclaration,
            NodeType::ImplicitClassDeclaration,
        ] {
            let idx = arena
                .allocate_type_declaration(node_type, 0, 1, "Foo".to_string(), TypeModifiers::default())
                .unwrap();
            let (name, _) = arena.get_type_declaration_attribute(idx).unwrap();
            assert_eq!(name, "Foo");
        }
    }

    #[test]
    fn empty_attribute_field_is_rejected() {
        let mut arena = NodeArena::new(1, 10);
        let err = arena.allocate_import(0, 1, String::new(), false).unwrap_err();
        assert_eq!(err, ArenaError::EmptyAttributeField { field: "qualified_name" });
    }
}
