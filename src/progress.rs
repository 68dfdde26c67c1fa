//! Batch progress reporting.

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

/// Percentage of `done` over `total`, `0.0` when there is nothing to do.
pub fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

/// Bytes uploaded across a batch, with an optional terminal progress bar.
///
/// The bar is only drawn when stderr is a terminal; counters are kept either way.
pub struct BatchProgress {
    bytes_done: u64,
    bytes_total: u64,
    label: String,
    bar: ProgressBar,
}

impl BatchProgress {
    pub fn new(bytes_total: u64) -> Self {
        let bar = if atty::is(atty::Stream::Stderr) {
            let bar = ProgressBar::new(bytes_total);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} | {elapsed_precise} elapsed, ETA {eta_precise}")
                .map(|style| style.progress_chars("█▓▒░ "))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };

        Self::with_bar(bytes_total, bar)
    }

    /// Counters only, never drawn.
    pub fn hidden(bytes_total: u64) -> Self {
        Self::with_bar(bytes_total, ProgressBar::hidden())
    }

    fn with_bar(bytes_total: u64, bar: ProgressBar) -> Self {
        Self {
            bytes_done: 0,
            bytes_total,
            label: String::new(),
            bar,
        }
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    pub fn percent_total(&self) -> f64 {
        percent(self.bytes_done, self.bytes_total)
    }

    /// Names the file reported next, e.g. `(2 of 5) photos.tar`.
    pub fn set_label(&mut self, label: String) {
        self.label = label;
    }

    /// Starts reporting on the labelled file once its size is known.
    pub fn start_file(&mut self, size: u64) {
        self.bar.set_message(format!(
            "| ⬆️  {} ({}), 0.00% done ({:.2}% total)",
            self.label,
            HumanBytes(size),
            self.percent_total()
        ));
    }

    /// Records a verified part; `file_offset` is the file position after the part.
    pub fn advance(&mut self, bytes: u64, file_offset: u64, file_size: u64) {
        self.bytes_done += bytes;
        self.bar.set_position(self.bytes_done);
        self.bar.set_message(format!(
            "| ⬆️  {}, {:.2}% done ({:.2}% total)",
            self.label,
            percent(file_offset, file_size),
            self.percent_total()
        ));
    }

    pub fn finish(&self) {
        self.bar
            .finish_with_message("✅ All files uploaded successfully!");
    }

    pub fn abandon(&self) {
        self.bar.abandon_with_message("❌ Upload failed!");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_handles_empty_total() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn test_advance_accumulates_across_files() {
        let mut progress = BatchProgress::hidden(300);
        progress.set_label("(1 of 2) a".to_string());
        progress.start_file(100);
        progress.advance(100, 100, 100);
        progress.set_label("(2 of 2) b".to_string());
        progress.start_file(200);
        progress.advance(150, 150, 200);

        assert_eq!(progress.bytes_done(), 250);
        assert_eq!(progress.bytes_total(), 300);
        assert!((progress.percent_total() - 83.333).abs() < 0.01);
    }
}
