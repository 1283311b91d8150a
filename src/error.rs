use thiserror::Error as ThisError;

/// Failures a caller may want to tell apart.
///
/// Library functions return `anyhow::Result`; these variants are carried
/// inside it un-wrapped, so `err.downcast_ref::<Error>()` recovers them.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Missing columns, bad constants, unusable parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested plot identifier is not in the plot index.
    #[error("plot {plot} not found in the index")]
    NotFound { plot: String },

    /// The index lists polygons for the plot but none could be recovered.
    #[error("no valid features found for plot {plot} ({expected} indexed, {skipped} unreadable)")]
    EmptyResult { plot: String, expected: usize, skipped: usize },

    /// One or more polygons have no biomass row in the attribute table.
    #[error("missing biomass data for {} polygon(s): {}", .ids.len(), .ids.join(", "))]
    MissingBiomass { ids: Vec<String> },

    /// A single geometry record could not be decoded. Logged and skipped.
    #[error("malformed record at byte {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },
}

impl Error {
    pub(crate) fn malformed(offset: u64, reason: impl std::fmt::Display) -> Self {
        Self::MalformedRecord { offset, reason: reason.to_string() }
    }
}
