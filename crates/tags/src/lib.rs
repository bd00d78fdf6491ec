//! Conversion between structured-text source and tag records.
//!
//! [`Extractor`] scans `VAR ... END_VAR` blocks for declarations of the form
//! `name : TYPE [:= default]; [// address=<addr> description]` and yields
//! [`Tag`]s scoped by their enclosing block. [`generate_code`] is the inverse:
//! it renders one block per scope with declarations sorted by name.
//!
//! Extraction is pure. Identical input always yields identical output.

mod extract;
mod generate;

pub use extract::{Extractor, extract_tags, new_tag_names, try_extract_tags};
pub use generate::{EMPTY_PROGRAM_TEMPLATE, generate_code};
pub use pandaura_primitives::{Tag, TagScope};

/// A convenient type alias for `Result` with `E` = [`ParseError`].
pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Structural faults in declaration blocks.
///
/// Lines that are not declarations are ignored rather than reported.
/// Line numbers are one-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
	#[error("{scope} block opened on line {line} is never closed with END_VAR")]
	UnterminatedBlock { scope: TagScope, line: usize },
	#[error("END_VAR on line {line} has no open block")]
	UnexpectedEndVar { line: usize },
	#[error("declaration block opened on line {line} inside another block")]
	NestedBlock { line: usize },
}

impl ParseError {
	pub const fn line(&self) -> usize {
		match self {
			Self::UnterminatedBlock { line, .. } | Self::UnexpectedEndVar { line } | Self::NestedBlock { line } => *line,
		}
	}
}
