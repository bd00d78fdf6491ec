/// Execution classes used to label spawned tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Socket I/O and keepalive for a live project connection.
	Connection,
	/// Editing-loop work that directly affects what the user sees.
	Interactive,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Connection => "connection",
			Self::Interactive => "interactive",
		}
	}
}
