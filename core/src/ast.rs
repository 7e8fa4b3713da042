//! The AST types consumed by the interpreter (§3.4). The tree is an arena:
//! [`Tree`] owns a flat vector of [`Node`]s and every reference between
//! nodes is a [`NodeId`] index, never a pointer — this sidesteps ownership
//! cycles and per-node allocation, matching the "raw ownership trees →
//! arenas + indices" redesign note.
//!
//! There is no functionality implemented here beyond named-child accessors;
//! evaluation lives in [`crate::interpreter`].

use std::fmt::{self, Display, Formatter};

/// An index into a [`Tree`]'s node vector.
pub type NodeId = u32;

/// The kind byte of an AST node (§3.4). Operators, cast targets, and
/// identifier text are *not* separate kinds; they ride in [`Node::value`]
/// so one `BinaryOp` kind, say, covers `+`, `-`, `==`, `&&`, etc.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    Program = 0,
    CompoundStatement = 1,
    FuncDef = 2,
    ParamDecl = 3,
    VarDecl = 4,
    Declarator = 5,
    PointerDeclarator = 6,
    ArrayDeclarator = 7,
    FunctionPointerDeclarator = 8,
    StructDeclaration = 9,
    MemberDecl = 10,
    TypedefDeclaration = 11,
    TypeName = 12,

    If = 13,
    For = 14,
    While = 15,
    DoWhile = 16,
    Switch = 17,
    Case = 18,
    Default = 19,
    Return = 20,
    Break = 21,
    Continue = 22,
    ExpressionStatement = 23,
    EmptyStatement = 24,

    FuncCall = 25,
    Identifier = 26,
    MemberAccess = 27,
    ArrayAccess = 28,
    BinaryOp = 29,
    UnaryOp = 30,
    Postfix = 31,
    Assignment = 32,
    CompoundAssignment = 33,
    CastExpression = 34,
    Ternary = 35,
    ArrayLiteral = 36,
    AddressOf = 37,
    Dereference = 38,

    NumberLiteral = 39,
    UnsignedLiteral = 40,
    FloatLiteral = 41,
    StringLiteral = 42,
    CharLiteral = 43,
    BoolLiteral = 44,
    NullLiteral = 45,
}

impl NodeKind {
    /// Decode a kind byte read off the wire. Unknown bytes are a hard
    /// decode error per §4.1.
    pub fn from_u8(byte: u8) -> Option<Self> {
        use NodeKind::*;
        let kind = match byte {
            0 => Program,
            1 => CompoundStatement,
            2 => FuncDef,
            3 => ParamDecl,
            4 => VarDecl,
            5 => Declarator,
            6 => PointerDeclarator,
            7 => ArrayDeclarator,
            8 => FunctionPointerDeclarator,
            9 => StructDeclaration,
            10 => MemberDecl,
            11 => TypedefDeclaration,
            12 => TypeName,
            13 => If,
            14 => For,
            15 => While,
            16 => DoWhile,
            17 => Switch,
            18 => Case,
            19 => Default,
            20 => Return,
            21 => Break,
            22 => Continue,
            23 => ExpressionStatement,
            24 => EmptyStatement,
            25 => FuncCall,
            26 => Identifier,
            27 => MemberAccess,
            28 => ArrayAccess,
            29 => BinaryOp,
            30 => UnaryOp,
            31 => Postfix,
            32 => Assignment,
            33 => CompoundAssignment,
            34 => CastExpression,
            35 => Ternary,
            36 => ArrayLiteral,
            37 => AddressOf,
            38 => Dereference,
            39 => NumberLiteral,
            40 => UnsignedLiteral,
            41 => FloatLiteral,
            42 => StringLiteral,
            43 => CharLiteral,
            44 => BoolLiteral,
            45 => NullLiteral,
            _ => return None,
        };
        Some(kind)
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Per-node flag bitmap (§3.4). A minimal hand-rolled bitmap rather than
/// pulling in `bitflags` for two bits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeFlags(pub u8);

impl NodeFlags {
    pub const HAS_VALUE: NodeFlags = NodeFlags(0b0000_0001);
    pub const HAS_CHILDREN: NodeFlags = NodeFlags(0b0000_0010);

    pub fn empty() -> Self {
        NodeFlags(0)
    }

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        NodeFlags(self.0 | rhs.0)
    }
}

/// The decoded value payload of a node: literal data, operator symbol,
/// identifier text, or cast/declared type name, depending on `kind`.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeValue {
    Str(String),
    Int(i32),
    UInt(u32),
    Float(f64),
    Bool(bool),
}

impl NodeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            NodeValue::Int(n) => Some(*n),
            NodeValue::UInt(n) => Some(*n as i32),
            _ => None,
        }
    }
}

/// One AST node: its kind, optional literal/symbol payload, and an ordered
/// list of children. "Named" children (e.g. `BinaryOp`'s `left`/`right`)
/// are just positional slices of `children`, sliced by the accessors below
/// per the table in §4.1 — the link pass that built this `Tree` already
/// verified each node's child count matches what its kind expects.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub value: Option<NodeValue>,
    pub children: Vec<NodeId>,
}

/// An immutable arena of decoded AST nodes, owned exclusively by the tree;
/// the interpreter only ever borrows it (§3.4).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub root: NodeId,
}

impl Tree {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn value_str(&self, id: NodeId) -> Option<&str> {
        self.node(id).value.as_ref().and_then(NodeValue::as_str)
    }

    // --- named-child accessors, per the table in spec §4.1 ---

    pub fn binary_op_operands(&self, id: NodeId) -> (NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1])
    }

    pub fn unary_operand(&self, id: NodeId) -> NodeId {
        self.children(id)[0]
    }

    pub fn member_access_parts(&self, id: NodeId) -> (NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1])
    }

    pub fn array_access_parts(&self, id: NodeId) -> (NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1])
    }

    pub fn if_parts(&self, id: NodeId) -> (NodeId, NodeId, Option<NodeId>) {
        let c = self.children(id);
        (c[0], c[1], c.get(2).copied())
    }

    pub fn for_parts(&self, id: NodeId) -> (NodeId, NodeId, NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1], c[2], c[3])
    }

    /// `While`'s `(condition, body)`; `DoWhile` reuses this accessor too —
    /// the caller is responsible for evaluating the body once before
    /// testing the condition, per the "order swapped semantically" note.
    pub fn while_parts(&self, id: NodeId) -> (NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1])
    }

    pub fn switch_parts(&self, id: NodeId) -> (NodeId, &[NodeId]) {
        let c = self.children(id);
        (c[0], &c[1..])
    }

    pub fn case_parts(&self, id: NodeId) -> (Option<NodeId>, &[NodeId]) {
        let c = self.children(id);
        match self.kind(id) {
            NodeKind::Default => (None, c),
            _ => (Some(c[0]), &c[1..]),
        }
    }

    pub fn var_decl_parts(&self, id: NodeId) -> (NodeId, &[NodeId]) {
        let c = self.children(id);
        (c[0], &c[1..])
    }

    pub fn cast_operand(&self, id: NodeId) -> NodeId {
        self.children(id)[0]
    }

    pub fn struct_decl_parts(&self, id: NodeId) -> (NodeId, &[NodeId]) {
        let c = self.children(id);
        (c[0], &c[1..])
    }

    pub fn ternary_parts(&self, id: NodeId) -> (NodeId, NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1], c[2])
    }

    pub fn func_def_parts(&self, id: NodeId) -> (NodeId, NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1], c[2])
    }

    pub fn func_call_parts(&self, id: NodeId) -> (NodeId, &[NodeId]) {
        let c = self.children(id);
        (c[0], &c[1..])
    }

    pub fn assignment_parts(&self, id: NodeId) -> (NodeId, NodeId) {
        let c = self.children(id);
        (c[0], c[1])
    }
}
