use std::collections::HashSet;
use std::sync::LazyLock;

use pandaura_primitives::{Tag, TagScope};
use regex::Regex;
use tracing::{trace, warn};

use crate::{ParseError, Result};

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?:(?i:AT)\s+(?P<at>%\S+?)\s*)?:\s*(?P<ty>[^:;=\s][^:;]*?)\s*(?::=\s*(?P<default>.+?)\s*)?;\s*(?://\s*(?P<comment>.*?))?\s*$",
	)
	.expect("declaration pattern is valid")
});

const END_VAR: &str = "END_VAR";
pub(crate) const ADDRESS_KEY: &str = "address=";

/// Extracts tags from structured text, optionally stamping a vendor.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
	vendor: Option<String>,
}

impl Extractor {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
		self.vendor = Some(vendor.into());
		self
	}

	pub fn vendor(&self) -> Option<&str> {
		self.vendor.as_deref()
	}

	/// Extracts tags, failing on the first structural fault.
	pub fn extract(&self, code: &str) -> Result<Vec<Tag>> {
		let scan = self.scan(code);
		match scan.faults.into_iter().next() {
			Some(fault) => Err(fault),
			None => Ok(scan.tags),
		}
	}

	/// Extracts every well-formed declaration, tolerating structural faults.
	pub fn extract_lenient(&self, code: &str) -> Vec<Tag> {
		let scan = self.scan(code);
		for fault in &scan.faults {
			trace!(error = %fault, "tags.extract.fault_ignored");
		}
		scan.tags
	}

	fn scan(&self, code: &str) -> Scan {
		let mut scan = Scan::default();
		let mut seen = HashSet::new();
		let mut open: Option<(TagScope, usize)> = None;
		let mut in_comment = false;

		for (idx, raw) in code.lines().enumerate() {
			let line_no = idx + 1;
			let stripped = strip_block_comments(raw, &mut in_comment);
			let line = stripped.trim();
			if line.is_empty() || line.starts_with("//") {
				continue;
			}

			let head = line.split(|c: char| c.is_whitespace() || c == ';').next().unwrap_or_default();
			if head.eq_ignore_ascii_case(END_VAR) {
				if open.take().is_none() {
					scan.faults.push(ParseError::UnexpectedEndVar { line: line_no });
				}
				continue;
			}
			if let Some(scope) = TagScope::from_keyword(head) {
				if open.is_some() {
					scan.faults.push(ParseError::NestedBlock { line: line_no });
				}
				open = Some((scope, line_no));
				continue;
			}

			let Some((scope, _)) = open else {
				continue;
			};
			let Some(tag) = self.parse_declaration(line, scope) else {
				continue;
			};
			if !seen.insert(tag.name.clone()) {
				warn!(name = %tag.name, line = line_no, "tags.extract.duplicate_name");
				continue;
			}
			scan.tags.push(tag);
		}

		if let Some((scope, line)) = open {
			scan.faults.push(ParseError::UnterminatedBlock { scope, line });
		}
		scan
	}

	fn parse_declaration(&self, line: &str, scope: TagScope) -> Option<Tag> {
		let caps = DECLARATION.captures(line)?;
		let mut tag = Tag::new(&caps["name"], &caps["ty"], scope);
		tag.default_value = caps.name("default").map(|m| m.as_str().to_string());
		tag.vendor = self.vendor.clone();
		tag.address = caps.name("at").map(|m| m.as_str().to_string());

		if let Some(comment) = caps.name("comment").map(|m| m.as_str().trim())
			&& !comment.is_empty()
		{
			match comment.strip_prefix(ADDRESS_KEY) {
				Some(rest) => {
					let (address, description) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
					if tag.address.is_none() && !address.is_empty() {
						tag.address = Some(address.to_string());
					}
					let description = description.trim();
					if !description.is_empty() {
						tag.description = Some(description.to_string());
					}
				}
				None => tag.description = Some(comment.to_string()),
			}
		}
		Some(tag)
	}
}

#[derive(Debug, Default)]
struct Scan {
	tags: Vec<Tag>,
	faults: Vec<ParseError>,
}

/// Removes `(* ... *)` comment text, tracking comments that span lines.
fn strip_block_comments(line: &str, in_comment: &mut bool) -> String {
	let mut out = String::with_capacity(line.len());
	let mut rest = line;
	loop {
		if *in_comment {
			match rest.find("*)") {
				Some(end) => {
					rest = &rest[end + 2..];
					*in_comment = false;
				}
				None => return out,
			}
		} else {
			match rest.find("(*") {
				Some(start) => {
					out.push_str(&rest[..start]);
					rest = &rest[start + 2..];
					*in_comment = true;
				}
				None => {
					out.push_str(rest);
					return out;
				}
			}
		}
	}
}

/// Extracts tags with no vendor, reporting the first structural fault.
pub fn try_extract_tags(code: &str) -> Result<Vec<Tag>> {
	Extractor::new().extract(code)
}

/// Extracts tags with no vendor, degrading structural faults to an empty result.
pub fn extract_tags(code: &str) -> Vec<Tag> {
	try_extract_tags(code).unwrap_or_else(|err| {
		warn!(error = %err, "tags.extract.failed");
		Vec::new()
	})
}

/// Names present in `current` but not in `previous`, in `current` order.
pub fn new_tag_names(previous: &[Tag], current: &[Tag]) -> Vec<String> {
	let known: HashSet<&str> = previous.iter().map(|tag| tag.name.as_str()).collect();
	current
		.iter()
		.filter(|tag| !known.contains(tag.name.as_str()))
		.map(|tag| tag.name.clone())
		.collect()
}
