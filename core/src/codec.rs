//! The CompactAST binary codec (§4.1): decodes (and re-encodes) the format
//! produced by the out-of-scope source-to-AST parser.
//!
//! Layout, little-endian:
//! 1. header: 4-byte magic `"ASTP"`, `u16` version, `u16` flags, `u32` node
//!    count, `u32` string-table byte size.
//! 2. string table: `u32` count, then that many `u16 length + utf8 bytes`.
//! 3. node table: `node_count` records of `kind:u8, flags:u8, data_size:u16`
//!    followed by `data_size` bytes of payload (optional value, `u16`
//!    child_count, then that many `u16` child indices).
//! 4. any trailing bytes are reserved sections; unknown ones are ignored.

use crate::{
    ast::{Node, NodeFlags, NodeKind, NodeValue, Tree},
    consts::{COMPACT_AST_MAGIC, COMPACT_AST_VERSION},
    error::DecodeError,
};

/// A cursor over the raw byte slice, tracking read position for precise
/// `Truncated` errors.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.bytes.len() {
            return Err(DecodeError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decode a CompactAST byte stream into a [`Tree`]. Performs the described
/// two-pass process: a flat read of every node record, then a link pass
/// that validates each node's declared children are in range. The decoder
/// treats a pre-order "child index > parent index" layout only as a
/// verification hint, never relying on it for correctness (§4.1).
pub fn decode(bytes: &[u8]) -> Result<Tree, DecodeError> {
    let mut r = Reader::new(bytes);

    let magic = r.take(4)?;
    if magic != COMPACT_AST_MAGIC {
        return Err(DecodeError::InvalidMagic);
    }
    let version = r.u16()?;
    if version != COMPACT_AST_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let _flags = r.u16()?;
    let node_count = r.u32()? as usize;
    let string_table_size = r.u32()? as usize;

    let string_table_start = r.pos;
    let strings = decode_string_table(&mut r)?;
    // Trust the declared size as an internal consistency check, but don't
    // hard-fail on drift: forward-compatible trailing sections may follow.
    let _ = string_table_size;
    let _ = string_table_start;

    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        nodes.push(decode_node(&mut r, &strings)?);
    }

    // Link pass: every declared child index must be in range. The named
    // positional slots per kind are enforced lazily by the `Tree` accessors
    // rather than re-validated here, since the accessor table and the
    // decode table are the same source of truth.
    for (i, node) in nodes.iter().enumerate() {
        for &child in &node.children {
            if child as usize >= nodes.len() {
                return Err(DecodeError::ChildIndexOutOfRange(child));
            }
            let _ = i;
        }
    }

    // Remaining bytes are reserved trailing sections; unknown ones are
    // ignored for forward compatibility (§4.1 point 4).
    let _ = r.remaining();

    Ok(Tree { nodes, root: 0 })
}

fn decode_string_table(r: &mut Reader) -> Result<Vec<String>, DecodeError> {
    let count = r.u32()? as usize;
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        let len = r.u16()? as usize;
        let bytes = r.take(len)?;
        let s = String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::StringIndexOutOfRange(strings.len() as u32))?;
        strings.push(s);
    }
    Ok(strings)
}

fn decode_node(r: &mut Reader, strings: &[String]) -> Result<Node, DecodeError> {
    let kind_byte = r.u8()?;
    let kind = NodeKind::from_u8(kind_byte).ok_or(DecodeError::UnknownNodeKind(kind_byte))?;
    let flags = NodeFlags(r.u8()?);
    let data_size = r.u16()? as usize;
    let data = r.take(data_size)?;
    let mut dr = Reader::new(data);

    let value = if flags.contains(NodeFlags::HAS_VALUE) {
        Some(decode_value(kind, &mut dr, strings)?)
    } else {
        None
    };

    let children = if flags.contains(NodeFlags::HAS_CHILDREN) {
        let child_count = dr.u16()? as usize;
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            children.push(dr.u16()? as u32);
        }
        children
    } else {
        Vec::new()
    };

    Ok(Node {
        kind,
        value,
        children,
    })
}

/// Decode the value payload for a node, dispatched per kind as §3.4/§4.1
/// describe: strings for identifiers/operators/cast targets, numbers for
/// literals, a handful of kinds carrying small enums encoded as `u8`.
fn decode_value(
    kind: NodeKind,
    r: &mut Reader,
    strings: &[String],
) -> Result<NodeValue, DecodeError> {
    use NodeKind::*;
    match kind {
        Identifier | BinaryOp | UnaryOp | Postfix | MemberAccess | CastExpression | TypeName
        | StringLiteral | CharLiteral | FunctionPointerDeclarator | ArrayDeclarator
        | PointerDeclarator | Declarator | ParamDecl | MemberDecl | TypedefDeclaration
        | StructDeclaration | CompoundAssignment | FuncDef => {
            let idx = r.u32()?;
            strings
                .get(idx as usize)
                .cloned()
                .map(NodeValue::Str)
                .ok_or(DecodeError::StringIndexOutOfRange(idx))
        }
        NumberLiteral => Ok(NodeValue::Int(r.u32()? as i32)),
        UnsignedLiteral => Ok(NodeValue::UInt(r.u32()?)),
        FloatLiteral => {
            let bits = r.take(8)?;
            let mut b = [0u8; 8];
            b.copy_from_slice(bits);
            Ok(NodeValue::Float(f64::from_le_bytes(b)))
        }
        BoolLiteral => Ok(NodeValue::Bool(r.u8()? != 0)),
        _ => {
            // No documented value payload for this kind; still consume a
            // string-index-shaped slot so a producer that emitted one
            // doesn't desync the reader.
            let idx = r.u32()?;
            strings
                .get(idx as usize)
                .cloned()
                .map(NodeValue::Str)
                .ok_or(DecodeError::StringIndexOutOfRange(idx))
        }
    }
}

/// Encode a [`Tree`] back to CompactAST bytes. The inverse of [`decode`];
/// identical layout is mandatory so the two stay interoperable (§4.1).
pub fn encode(tree: &Tree) -> Vec<u8> {
    let mut strings: Vec<String> = Vec::new();
    let mut string_index = std::collections::HashMap::new();
    let mut intern = |s: &str, strings: &mut Vec<String>| -> u32 {
        if let Some(&idx) = string_index.get(s) {
            return idx;
        }
        let idx = strings.len() as u32;
        strings.push(s.to_string());
        string_index.insert(s.to_string(), idx);
        idx
    };

    let mut node_bytes = Vec::new();
    for node in &tree.nodes {
        node_bytes.push(encode_node(node, &mut strings, &mut intern));
    }

    let mut string_table = Vec::new();
    string_table.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in &strings {
        string_table.extend_from_slice(&(s.len() as u16).to_le_bytes());
        string_table.extend_from_slice(s.as_bytes());
    }

    let mut out = Vec::new();
    out.extend_from_slice(&COMPACT_AST_MAGIC);
    out.extend_from_slice(&COMPACT_AST_VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // flags
    out.extend_from_slice(&(tree.nodes.len() as u32).to_le_bytes());
    out.extend_from_slice(&(string_table.len() as u32).to_le_bytes());
    out.extend_from_slice(&string_table);
    for record in node_bytes {
        out.extend_from_slice(&record);
    }
    out
}

fn encode_node(
    node: &Node,
    strings: &mut Vec<String>,
    intern: &mut impl FnMut(&str, &mut Vec<String>) -> u32,
) -> Vec<u8> {
    let mut flags = NodeFlags::empty();
    let mut payload = Vec::new();

    if let Some(value) = &node.value {
        flags.insert(NodeFlags::HAS_VALUE);
        match value {
            NodeValue::Str(s) => payload.extend_from_slice(&intern(s, strings).to_le_bytes()),
            NodeValue::Int(n) => payload.extend_from_slice(&(*n as u32).to_le_bytes()),
            NodeValue::UInt(n) => payload.extend_from_slice(&n.to_le_bytes()),
            NodeValue::Float(f) => payload.extend_from_slice(&f.to_le_bytes()),
            NodeValue::Bool(b) => payload.push(*b as u8),
        }
    }

    if !node.children.is_empty() {
        flags.insert(NodeFlags::HAS_CHILDREN);
        payload.extend_from_slice(&(node.children.len() as u16).to_le_bytes());
        for &child in &node.children {
            payload.extend_from_slice(&(child as u16).to_le_bytes());
        }
    }

    let mut record = Vec::with_capacity(4 + payload.len());
    record.push(node.kind as u8);
    record.push(flags.0);
    record.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    record.extend_from_slice(&payload);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use std::convert::TryInto;

    fn leaf(kind: NodeKind, value: Option<NodeValue>) -> Node {
        Node {
            kind,
            value,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_round_trip_minimal_program() {
        // Program { CompoundStatement { } } — an empty program body.
        let tree = Tree {
            nodes: vec![
                Node {
                    kind: NodeKind::Program,
                    value: None,
                    children: vec![1],
                },
                leaf(NodeKind::CompoundStatement, None),
            ],
            root: 0,
        };
        let bytes = encode(&tree);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.nodes.len(), 2);
        assert_eq!(decoded.kind(0), NodeKind::Program);
        assert_eq!(decoded.children(0), &[1]);
        assert_eq!(decoded.kind(1), NodeKind::CompoundStatement);
    }

    #[test]
    fn test_invalid_magic_is_rejected() {
        let bytes = b"XXXX".to_vec();
        assert_eq!(decode(&bytes), Err(DecodeError::InvalidMagic));
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let bytes = COMPACT_AST_MAGIC.to_vec();
        assert!(matches!(decode(&bytes), Err(DecodeError::Truncated(_))));
    }

    #[test]
    fn test_unknown_node_kind_is_rejected() {
        let tree = Tree {
            nodes: vec![leaf(NodeKind::Identifier, Some(NodeValue::Str("x".into())))],
            root: 0,
        };
        let mut bytes = encode(&tree);
        // Corrupt the first node's kind byte (right after the header +
        // string table) to an out-of-range value.
        let string_table_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let node_start = 12 + string_table_len;
        bytes[node_start] = 0xFE;
        assert!(matches!(decode(&bytes), Err(DecodeError::UnknownNodeKind(0xFE))));
    }

    #[test]
    fn test_child_index_out_of_range_is_rejected() {
        let tree = Tree {
            nodes: vec![Node {
                kind: NodeKind::Program,
                value: None,
                children: vec![5],
            }],
            root: 0,
        };
        let bytes = encode(&tree);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::ChildIndexOutOfRange(5))
        ));
    }

    #[test]
    fn test_float_literal_round_trips() {
        let tree = Tree {
            nodes: vec![leaf(NodeKind::FloatLiteral, Some(NodeValue::Float(3.5)))],
            root: 0,
        };
        let bytes = encode(&tree);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.node(0).value, Some(NodeValue::Float(3.5)));
    }
}
