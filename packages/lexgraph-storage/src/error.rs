use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(sqlx::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Failed to read corpus file at {path:?}.")]
	ReadCorpus {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	/// The backing database could not be reached.
	#[error("Store unavailable: {0}")]
	Unavailable(String),
}

impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		match &err {
			sqlx::Error::PoolTimedOut
			| sqlx::Error::PoolClosed
			| sqlx::Error::WorkerCrashed
			| sqlx::Error::Io(_)
			| sqlx::Error::Tls(_) => Self::Unavailable(err.to_string()),
			_ => Self::Sqlx(err),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io;

	use super::*;

	#[test]
	fn connectivity_failures_map_to_unavailable() {
		let timed_out = Error::from(sqlx::Error::PoolTimedOut);
		let refused =
			Error::from(sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));

		assert!(matches!(timed_out, Error::Unavailable(_)));
		assert!(matches!(refused, Error::Unavailable(message) if message.contains("refused")));
	}

	#[test]
	fn query_errors_stay_sqlx() {
		assert!(matches!(Error::from(sqlx::Error::RowNotFound), Error::Sqlx(_)));
	}
}
