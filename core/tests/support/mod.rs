//! A minimal AST builder for integration tests. Node 0 is always the
//! `Program` node, matching [`sketch_interpreter::codec::decode`]'s
//! hardcoded root index (the wire format carries no root-index field of
//! its own).

use sketch_interpreter::ast::{Node, NodeId, NodeKind, NodeValue, Tree};
use sketch_interpreter::codec;

pub struct TreeBuilder {
    nodes: Vec<Node>,
}

fn leaf(kind: NodeKind, value: Option<NodeValue>) -> Node {
    Node {
        kind,
        value,
        children: Vec::new(),
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![leaf(NodeKind::Program, None)],
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    /// Finish the tree, filling in the `Program` node's children, and
    /// encode it to CompactAST bytes ready for `Interpreter::new`.
    pub fn bytes(mut self, top_level: Vec<NodeId>) -> Vec<u8> {
        self.nodes[0].children = top_level;
        let tree = Tree { nodes: self.nodes, root: 0 };
        codec::encode(&tree)
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        self.push(leaf(NodeKind::Identifier, Some(NodeValue::Str(name.to_string()))))
    }

    pub fn num(&mut self, n: i32) -> NodeId {
        self.push(leaf(NodeKind::NumberLiteral, Some(NodeValue::Int(n))))
    }

    pub fn uint(&mut self, n: u32) -> NodeId {
        self.push(leaf(NodeKind::UnsignedLiteral, Some(NodeValue::UInt(n))))
    }

    pub fn float(&mut self, f: f64) -> NodeId {
        self.push(leaf(NodeKind::FloatLiteral, Some(NodeValue::Float(f))))
    }

    pub fn bool_lit(&mut self, b: bool) -> NodeId {
        self.push(leaf(NodeKind::BoolLiteral, Some(NodeValue::Bool(b))))
    }

    pub fn string_lit(&mut self, s: &str) -> NodeId {
        self.push(leaf(NodeKind::StringLiteral, Some(NodeValue::Str(s.to_string()))))
    }

    pub fn type_name(&mut self, s: &str) -> NodeId {
        self.push(leaf(NodeKind::TypeName, Some(NodeValue::Str(s.to_string()))))
    }

    pub fn binary(&mut self, op: &str, left: NodeId, right: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::BinaryOp,
            value: Some(NodeValue::Str(op.to_string())),
            children: vec![left, right],
        })
    }

    pub fn unary(&mut self, op: &str, operand: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::UnaryOp,
            value: Some(NodeValue::Str(op.to_string())),
            children: vec![operand],
        })
    }

    pub fn postfix(&mut self, op: &str, operand: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::Postfix,
            value: Some(NodeValue::Str(op.to_string())),
            children: vec![operand],
        })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::Assignment,
            value: None,
            children: vec![target, value],
        })
    }

    pub fn compound_assign(&mut self, op: &str, target: NodeId, value: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::CompoundAssignment,
            value: Some(NodeValue::Str(op.to_string())),
            children: vec![target, value],
        })
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let mut children = vec![callee];
        children.extend(args);
        self.push(Node {
            kind: NodeKind::FuncCall,
            value: None,
            children,
        })
    }

    pub fn member_access(&mut self, object: NodeId, field: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::MemberAccess,
            value: None,
            children: vec![object, field],
        })
    }

    pub fn array_access(&mut self, array: NodeId, index: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::ArrayAccess,
            value: None,
            children: vec![array, index],
        })
    }

    pub fn array_literal(&mut self, items: Vec<NodeId>) -> NodeId {
        self.push(Node {
            kind: NodeKind::ArrayLiteral,
            value: None,
            children: items,
        })
    }

    pub fn address_of(&mut self, operand: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::AddressOf,
            value: None,
            children: vec![operand],
        })
    }

    pub fn dereference(&mut self, operand: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::Dereference,
            value: None,
            children: vec![operand],
        })
    }

    pub fn cast(&mut self, type_name: &str, operand: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::CastExpression,
            value: Some(NodeValue::Str(type_name.to_string())),
            children: vec![operand],
        })
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::ExpressionStatement,
            value: None,
            children: vec![expr],
        })
    }

    pub fn empty_stmt(&mut self) -> NodeId {
        self.push(leaf(NodeKind::EmptyStatement, None))
    }

    pub fn break_stmt(&mut self) -> NodeId {
        self.push(leaf(NodeKind::Break, None))
    }

    pub fn return_stmt(&mut self, expr: Option<NodeId>) -> NodeId {
        self.push(Node {
            kind: NodeKind::Return,
            value: None,
            children: expr.into_iter().collect(),
        })
    }

    pub fn compound(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.push(Node {
            kind: NodeKind::CompoundStatement,
            value: None,
            children: stmts,
        })
    }

    pub fn declarator(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
        self.push(Node {
            kind: NodeKind::Declarator,
            value: Some(NodeValue::Str(name.to_string())),
            children: init.into_iter().collect(),
        })
    }

    pub fn var_decl(&mut self, type_id: NodeId, declarators: Vec<NodeId>) -> NodeId {
        let mut children = vec![type_id];
        children.extend(declarators);
        self.push(Node {
            kind: NodeKind::VarDecl,
            value: None,
            children,
        })
    }

    pub fn param_decl(&mut self, type_id: NodeId, name: &str) -> NodeId {
        let name_id = self.ident(name);
        self.push(Node {
            kind: NodeKind::ParamDecl,
            value: None,
            children: vec![type_id, name_id],
        })
    }

    pub fn params(&mut self, list: Vec<NodeId>) -> NodeId {
        self.push(Node {
            kind: NodeKind::CompoundStatement,
            value: None,
            children: list,
        })
    }

    pub fn func_def(&mut self, name: &str, return_type: NodeId, params: NodeId, body: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::FuncDef,
            value: Some(NodeValue::Str(name.to_string())),
            children: vec![return_type, params, body],
        })
    }

    pub fn if_stmt(&mut self, cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId>) -> NodeId {
        let mut children = vec![cond, then_branch];
        children.extend(else_branch);
        self.push(Node {
            kind: NodeKind::If,
            value: None,
            children,
        })
    }

    pub fn for_stmt(&mut self, init: NodeId, cond: NodeId, update: NodeId, body: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::For,
            value: None,
            children: vec![init, cond, update, body],
        })
    }

    pub fn while_stmt(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.push(Node {
            kind: NodeKind::While,
            value: None,
            children: vec![cond, body],
        })
    }

    pub fn switch_stmt(&mut self, subject: NodeId, cases: Vec<NodeId>) -> NodeId {
        let mut children = vec![subject];
        children.extend(cases);
        self.push(Node {
            kind: NodeKind::Switch,
            value: None,
            children,
        })
    }

    pub fn case_stmt(&mut self, test: NodeId, stmts: Vec<NodeId>) -> NodeId {
        let mut children = vec![test];
        children.extend(stmts);
        self.push(Node {
            kind: NodeKind::Case,
            value: None,
            children,
        })
    }

    pub fn default_stmt(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.push(Node {
            kind: NodeKind::Default,
            value: None,
            children: stmts,
        })
    }

    pub fn struct_decl(&mut self, name: &str, members: Vec<NodeId>) -> NodeId {
        let name_id = self.ident(name);
        let mut children = vec![name_id];
        children.extend(members);
        self.push(Node {
            kind: NodeKind::StructDeclaration,
            value: None,
            children,
        })
    }

    pub fn member_decl(&mut self, type_id: NodeId, field_name: &str) -> NodeId {
        let name_id = self.ident(field_name);
        self.push(Node {
            kind: NodeKind::MemberDecl,
            value: None,
            children: vec![type_id, name_id],
        })
    }
}
