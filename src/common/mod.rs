mod fs;

pub use fs::SourceFingerprint;
pub(crate) use fs::*;
