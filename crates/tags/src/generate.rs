use std::fmt::Write;

use pandaura_primitives::{Tag, TagScope};

use crate::extract::ADDRESS_KEY;

/// Code emitted for a project with no tags.
pub const EMPTY_PROGRAM_TEMPLATE: &str = "PROGRAM Main
VAR
    (* No variables declared yet. Add tags here or in the tag database. *)
END_VAR

(* Program logic *)

END_PROGRAM
";

const INDENT: &str = "    ";

/// Renders tags as structured-text declaration blocks.
///
/// One block per scope in [`TagScope::EMIT_ORDER`], declarations sorted by
/// name. An empty tag list yields [`EMPTY_PROGRAM_TEMPLATE`].
pub fn generate_code(tags: &[Tag]) -> String {
	if tags.is_empty() {
		return EMPTY_PROGRAM_TEMPLATE.to_string();
	}

	let mut blocks = Vec::new();
	for scope in TagScope::EMIT_ORDER {
		let mut scoped: Vec<&Tag> = tags.iter().filter(|tag| tag.scope == scope).collect();
		if scoped.is_empty() {
			continue;
		}
		scoped.sort_by(|a, b| a.name.cmp(&b.name));

		let mut block = String::new();
		block.push_str(scope.keyword());
		block.push('\n');
		for tag in scoped {
			block.push_str(INDENT);
			write_declaration(&mut block, tag);
			block.push('\n');
		}
		block.push_str("END_VAR\n");
		blocks.push(block);
	}
	blocks.join("\n")
}

fn write_declaration(out: &mut String, tag: &Tag) {
	let _ = write!(out, "{} : {}", tag.name, tag.data_type);
	if let Some(default) = &tag.default_value {
		let _ = write!(out, " := {default}");
	}
	out.push(';');

	match (&tag.address, &tag.description) {
		(Some(address), Some(description)) => {
			let _ = write!(out, " // {ADDRESS_KEY}{address} {description}");
		}
		(Some(address), None) => {
			let _ = write!(out, " // {ADDRESS_KEY}{address}");
		}
		// An empty address keeps the description from being read as one.
		(None, Some(description)) if description.starts_with(ADDRESS_KEY) => {
			let _ = write!(out, " // {ADDRESS_KEY} {description}");
		}
		(None, Some(description)) => {
			let _ = write!(out, " // {description}");
		}
		(None, None) => {}
	}
}
