//! Process-wide tables the evaluator consults but that aren't part of any
//! one scope: struct type layouts, typedef aliases, live struct instances,
//! user function definitions, and the pointer-id allocator (§4.5, §4.7).

use crate::ast::NodeId;
use crate::value::{PointerId, StructHandle, Value};
use std::collections::HashMap;

/// A struct type's field list, in declaration order: `(field_name,
/// field_type)`.
pub type StructLayout = Vec<(String, String)>;

/// A live struct instance: its type name plus current field values. Stored
/// behind a [`StructHandle`] so copying a [`Value::Struct`] copies only the
/// handle, matching the "struct values are handles, not inline data" model
/// used for the `VAR_SET`/`STRUCT_FIELD_SET` payload in §6.
#[derive(Clone, Debug)]
pub struct StructInstance {
    pub type_name: String,
    pub fields: HashMap<String, Value>,
    pub field_order: Vec<String>,
}

/// Struct/typedef declarations, struct instances, user functions, and the
/// pointer-id counter, all addressed by name or handle rather than by AST
/// position.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    struct_types: HashMap<String, StructLayout>,
    typedefs: HashMap<String, String>,
    instances: HashMap<StructHandle, StructInstance>,
    functions: HashMap<String, NodeId>,
    next_struct_handle: StructHandle,
    next_pointer_id: PointerId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_struct_type(&mut self, name: &str, layout: StructLayout) {
        self.struct_types.insert(name.to_string(), layout);
    }

    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.struct_types.get(name)
    }

    pub fn declare_typedef(&mut self, alias: &str, target: &str) {
        self.typedefs.insert(alias.to_string(), target.to_string());
    }

    /// Resolve a possibly-aliased type name to its underlying name,
    /// following typedef chains (bounded to avoid looping on a cyclic
    /// typedef, which is a malformed program we simply stop resolving).
    pub fn resolve_type(&self, name: &str) -> String {
        let mut current = name.to_string();
        for _ in 0..32 {
            match self.typedefs.get(&current) {
                Some(target) if target != &current => current = target.clone(),
                _ => break,
            }
        }
        current
    }

    /// Allocate a new struct instance of `type_name`, with every field
    /// defaulted per [`Value::default`], and return its handle.
    pub fn create_struct_instance(&mut self, type_name: &str) -> StructHandle {
        let handle = self.next_struct_handle;
        self.next_struct_handle += 1;
        let layout = self
            .struct_layout(type_name)
            .cloned()
            .unwrap_or_default();
        let mut fields = HashMap::new();
        let mut field_order = Vec::new();
        for (field_name, _field_type) in &layout {
            fields.insert(field_name.clone(), Value::default());
            field_order.push(field_name.clone());
        }
        self.instances.insert(
            handle,
            StructInstance {
                type_name: type_name.to_string(),
                fields,
                field_order,
            },
        );
        handle
    }

    pub fn struct_instance(&self, handle: StructHandle) -> Option<&StructInstance> {
        self.instances.get(&handle)
    }

    pub fn struct_instance_mut(&mut self, handle: StructHandle) -> Option<&mut StructInstance> {
        self.instances.get_mut(&handle)
    }

    pub fn declare_function(&mut self, name: &str, def_node: NodeId) {
        self.functions.insert(name.to_string(), def_node);
    }

    pub fn function(&self, name: &str) -> Option<NodeId> {
        self.functions.get(name).copied()
    }

    pub fn next_pointer_id(&mut self) -> PointerId {
        let id = self.next_pointer_id;
        self.next_pointer_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_instance_defaults_fields() {
        let mut reg = Registry::new();
        reg.declare_struct_type(
            "Point",
            vec![("x".to_string(), "int".to_string()), ("y".to_string(), "int".to_string())],
        );
        let handle = reg.create_struct_instance("Point");
        let instance = reg.struct_instance(handle).unwrap();
        assert_eq!(instance.type_name, "Point");
        assert_eq!(instance.fields.get("x"), Some(&Value::Null));
        assert_eq!(instance.field_order, vec!["x", "y"]);
    }

    #[test]
    fn test_typedef_resolution_chain() {
        let mut reg = Registry::new();
        reg.declare_typedef("Speed", "int");
        reg.declare_typedef("Velocity", "Speed");
        assert_eq!(reg.resolve_type("Velocity"), "int");
    }

    #[test]
    fn test_struct_handles_are_unique() {
        let mut reg = Registry::new();
        reg.declare_struct_type("Point", vec![]);
        let a = reg.create_struct_instance("Point");
        let b = reg.create_struct_instance("Point");
        assert_ne!(a, b);
    }

    #[test]
    fn test_pointer_id_allocation_is_monotonic() {
        let mut reg = Registry::new();
        let a = reg.next_pointer_id();
        let b = reg.next_pointer_id();
        assert_eq!(b, a + 1);
    }
}
