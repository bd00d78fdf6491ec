use pandaura_primitives::VersionNumber;

use crate::SchemaError;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The backend rejected a durable write.
	#[error("save failed: {0}")]
	Save(String),
	#[error("version {0} not found")]
	VersionNotFound(VersionNumber),
	/// The backend could not be reached or answered unexpectedly.
	#[error("storage error: {0}")]
	Storage(String),
	#[error(transparent)]
	Schema(#[from] SchemaError),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("codec error: {0}")]
	Codec(#[from] serde_json::Error),
}

impl Error {
	/// Whether repeating the same request could succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Save(_) | Self::Storage(_) | Self::Io(_))
	}

	/// Turns a storage failure during a write into [`Error::Save`], leaving
	/// more specific errors untouched.
	pub(crate) fn into_save(self) -> Self {
		match self {
			Self::Storage(reason) => Self::Save(reason),
			Self::Io(err) => Self::Save(err.to_string()),
			other => other,
		}
	}
}
