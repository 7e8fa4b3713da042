//! Variable scoping (§4.2): a stack of insertion-ordered scopes implementing
//! lexical shadowing. Lookups walk innermost-to-outermost; declarations
//! always land in the innermost scope.

use crate::error::RuntimeError;
use crate::value::Value;
use std::collections::HashMap;

/// A single declared variable: its current value, declared type name (kept
/// as text since the interpreter does no static type checking), and whether
/// writes to it are rejected.
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub declared_type: String,
    pub value: Value,
    pub is_const: bool,
}

/// One lexical scope. Preserves declaration order (`order`) alongside the
/// lookup map, since some hosts want to enumerate variables the way they
/// were declared (e.g. a future `locals` introspection command).
#[derive(Clone, Debug, Default)]
pub struct Scope {
    vars: HashMap<String, Variable>,
    order: Vec<String>,
}

impl Scope {
    fn new() -> Self {
        Self::default()
    }

    fn declare(&mut self, var: Variable) {
        if !self.vars.contains_key(&var.name) {
            self.order.push(var.name.clone());
        }
        self.vars.insert(var.name.clone(), var);
    }

    fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.vars.get_mut(name)
    }
}

/// The live scope chain: index 0 is the outermost (global) scope, the last
/// entry is the innermost. Pushed on function/block/loop-body entry, popped
/// on exit (§4.2).
#[derive(Clone, Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    /// A stack with a single, empty global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare `name` in the innermost scope, shadowing any outer variable
    /// of the same name for the remainder of this scope's lifetime.
    pub fn declare(&mut self, name: &str, declared_type: &str, value: Value, is_const: bool) {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        scope.declare(Variable {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            value,
            is_const,
        });
    }

    /// Declare directly into the global (outermost) scope, used for the
    /// Arduino constant seed set and for top-level `VarDecl`s outside any
    /// function (§4.2, §5.1).
    pub fn declare_global(&mut self, name: &str, declared_type: &str, value: Value, is_const: bool) {
        self.scopes[0].declare(Variable {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            value,
            is_const,
        });
    }

    pub fn exists(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.get(name).is_some())
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Overwrite an existing variable's value, walking outward from the
    /// innermost scope until one declares `name`. Rejects writes to `const`
    /// variables with [`RuntimeError::ConstWrite`], and missing variables
    /// with [`RuntimeError::UndefinedVariable`].
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(var) = scope.get_mut(name) {
                if var.is_const {
                    return Err(RuntimeError::ConstWrite);
                }
                var.value = value;
                return Ok(());
            }
        }
        Err(RuntimeError::UndefinedVariable)
    }

    /// Seed the global scope with the Arduino constants every sketch can
    /// reference without declaring (pin modes, digital levels, keyboard
    /// codes) (§5.1).
    pub fn seed_arduino_constants(&mut self) {
        let ints = [
            ("HIGH", 1),
            ("LOW", 0),
            ("INPUT", 0),
            ("OUTPUT", 1),
            ("INPUT_PULLUP", 2),
            ("LED_BUILTIN", 13),
            ("true", 1),
            ("false", 0),
            ("A0", 14),
            ("A1", 15),
            ("A2", 16),
            ("A3", 17),
            ("A4", 18),
            ("A5", 19),
        ];
        for (name, value) in ints {
            self.declare_global(name, "const int", Value::I32(value), true);
        }

        let keyboard = [
            ("KEY_RETURN", 0xB0u16),
            ("KEY_ESC", 0xB1),
            ("KEY_BACKSPACE", 0xB2),
            ("KEY_TAB", 0xB3),
            ("KEY_CAPS_LOCK", 0xC1),
            ("KEY_UP_ARROW", 0xDA),
            ("KEY_DOWN_ARROW", 0xD9),
            ("KEY_LEFT_ARROW", 0xD8),
            ("KEY_RIGHT_ARROW", 0xD7),
        ];
        for (name, value) in keyboard {
            self.declare_global(name, "const int", Value::I32(value as i32), true);
        }
    }
}
