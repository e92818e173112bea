//! RDF node values as stored in the relational `NODES` table
//!
//! Node values are serialized as plain strings next to a numeric node type.
//! Literals carry their language tag or datatype inline:
//! `"hello"^^http://www.w3.org/2001/XMLSchema#string`, `"bonjour"@fr`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash32;

/// Numeric node type codes used in `NODES.nodeType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
	Blank = 0,
	Uri = 1,
	Literal = 2,
}

impl NodeType {
	pub fn from_code(code: i64) -> Option<Self> {
		match code {
			0 => Some(NodeType::Blank),
			1 => Some(NodeType::Uri),
			2 => Some(NodeType::Literal),
			_ => None,
		}
	}

	pub fn code(self) -> i64 {
		self as i64
	}
}

/// A decoded RDF node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
	Uri(String),
	Blank(String),
	Literal {
		value: String,
		language: Option<String>,
		datatype: Option<String>,
	},
}

impl Node {
	pub fn uri(uri: impl Into<String>) -> Self {
		Node::Uri(uri.into())
	}

	pub fn blank(id: impl Into<String>) -> Self {
		Node::Blank(id.into())
	}

	pub fn plain(value: impl Into<String>) -> Self {
		Node::Literal { value: value.into(), language: None, datatype: None }
	}

	pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
		Node::Literal { value: value.into(), language: Some(language.into()), datatype: None }
	}

	pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
		Node::Literal { value: value.into(), language: None, datatype: Some(datatype.into()) }
	}

	/// Decode a serialized `NODES.nodeValue` of the given type
	pub fn decode(node_type: NodeType, value: &str) -> Self {
		match node_type {
			NodeType::Uri => Node::Uri(value.to_string()),
			NodeType::Blank => Node::Blank(value.strip_prefix("_:").unwrap_or(value).to_string()),
			NodeType::Literal => decode_literal(value),
		}
	}

	pub fn node_type(&self) -> NodeType {
		match self {
			Node::Uri(_) => NodeType::Uri,
			Node::Blank(_) => NodeType::Blank,
			Node::Literal { .. } => NodeType::Literal,
		}
	}

	/// Inverse of [`Node::decode`]
	pub fn encode(&self) -> String {
		match self {
			Node::Uri(uri) => uri.clone(),
			Node::Blank(id) => format!("_:{id}"),
			Node::Literal { value, language: Some(lang), .. } => format!("\"{value}\"@{lang}"),
			Node::Literal { value, datatype: Some(dt), .. } => format!("\"{value}\"^^{dt}"),
			Node::Literal { value, .. } => format!("\"{value}\""),
		}
	}

	/// Stable 32-bit hash of the node's canonical form
	pub fn stable_hash(&self) -> i32 {
		hash_text(&self.to_string())
	}
}

impl fmt::Display for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Node::Uri(uri) => write!(f, "<{uri}>"),
			Node::Blank(id) => write!(f, "_:{id}"),
			Node::Literal { value, language: Some(lang), .. } => write!(f, "\"{value}\"@{lang}"),
			Node::Literal { value, datatype: Some(dt), .. } => write!(f, "\"{value}\"^^<{dt}>"),
			Node::Literal { value, .. } => write!(f, "\"{value}\""),
		}
	}
}

/// Decode a serialized literal.
///
/// A value containing `^^` is a typed literal split at the last `^^`. Otherwise a
/// trailing `@xx` / `@xx-XX` tag makes it a language literal split at the last `@`.
/// Anything else is a plain literal.
pub fn decode_literal(value: &str) -> Node {
	if let Some(split) = value.rfind("^^") {
		let lexical = unquote(&value[..split]);
		let datatype = value[split + 2..].trim_start_matches('<').trim_end_matches('>');
		return Node::typed(lexical, datatype);
	}

	if let Some(split) = value.rfind('@') {
		let tag = &value[split + 1..];
		if is_language_tag(tag) {
			return Node::lang(unquote(&value[..split]), tag);
		}
	}

	Node::plain(unquote(value))
}

fn unquote(lexical: &str) -> &str {
	if lexical.len() >= 2 && lexical.starts_with('"') && lexical.ends_with('"') {
		&lexical[1..lexical.len() - 1]
	} else {
		lexical
	}
}

// xx or xx-XX
fn is_language_tag(tag: &str) -> bool {
	let letters = |part: &str| part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic());
	match tag.split_once('-') {
		Some((primary, region)) => letters(primary) && letters(region),
		None => letters(tag),
	}
}

/// 32-bit xxHash of a string, stored as a signed column value
pub fn hash_text(text: &str) -> i32 {
	let mut hasher = XxHash32::with_seed(0);
	hasher.write(text.as_bytes());
	hasher.finish() as u32 as i32
}

/// Hash of a triple, derived from its node hashes in subject, predicate, object order
pub fn triple_hash(subject: i64, predicate: i64, object: i64) -> i32 {
	hash_text(&format!("{subject}{predicate}{object}"))
}
