use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors: anything here aborts the run.
///
/// File- and record-level problems are recovered locally and therefore
/// live outside this enum ([`MalformedFile`], [`MalformedRecord`]).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no files matching products_*.json under {}", .path.display())]
    NoInputFiles { path: PathBuf },

    #[error("config: {0}")]
    Config(String),

    #[error("database connection: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("schema bootstrap failed: {source}")]
    Schema {
        /// Remediation advice, set for privilege failures (SQLSTATE 42501).
        hint: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Batch(#[from] BatchFailure),
}

impl IngestError {
    /// Process exit code: input/configuration problems exit 2, store
    /// problems exit 3.
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestError::NoInputFiles { .. } | IngestError::Config(_) => 2,
            IngestError::Connection(_) | IngestError::Schema { .. } | IngestError::Batch(_) => 3,
        }
    }
}

/// A transactional batch apply failed and was rolled back. Batches
/// committed earlier in the run stay committed.
#[derive(Debug, Error)]
#[error("batch apply failed for {} product id(s) [{}]: {source}", .product_ids.len(), summarize_ids(.product_ids))]
pub struct BatchFailure {
    pub product_ids: Vec<i64>,
    #[source]
    pub source: sqlx::Error,
}

fn summarize_ids(ids: &[i64]) -> String {
    match (ids.first(), ids.last()) {
        (Some(first), Some(last)) if ids.len() > 2 => format!("{first}..{last}"),
        _ => ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// One input file could not be parsed; the rest of that file is skipped
/// and the run continues.
#[derive(Debug, Error)]
#[error("{file}: invalid JSON at line {line}, column {column}: {message}")]
pub struct MalformedFile {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// One record inside an otherwise valid file failed validation; the
/// record is skipped and the run continues.
#[derive(Debug, Error)]
#[error("{file}: {reason}")]
pub struct MalformedRecord {
    pub file: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_failure_names_the_id_range() {
        let err = BatchFailure {
            product_ids: vec![10, 11, 12, 13],
            source: sqlx::Error::PoolClosed,
        };
        let msg = err.to_string();
        assert!(msg.contains("4 product id(s)"), "{msg}");
        assert!(msg.contains("10..13"), "{msg}");
    }

    #[test]
    fn exit_codes_split_input_from_store_failures() {
        assert_eq!(
            IngestError::NoInputFiles {
                path: PathBuf::from("./data")
            }
            .exit_code(),
            2
        );
        assert_eq!(IngestError::Config("bad".into()).exit_code(), 2);
        assert_eq!(
            IngestError::Connection(sqlx::Error::PoolClosed).exit_code(),
            3
        );
    }
}
