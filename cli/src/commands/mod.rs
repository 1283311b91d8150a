pub mod index;
pub mod plots;
pub mod raster;

use indicatif::{ProgressBar, ProgressStyle};

/// Byte-count progress bar for the index scan.
pub(crate) fn scan_progress() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_message("indexing features");
    Ok(bar)
}
