use indicatif::{ProgressBar, ProgressStyle};

/// Byte-level progress observer, invoked synchronously once per
/// transferred chunk. Implementations must not fail; reporting can never
/// mask a transfer outcome.
pub trait ProgressSink: Send + Sync {
    fn on_chunk(&self, chunk: u64, remaining: u64, total: u64);

    /// Called once after the transfer ends, success or not.
    fn finish(&self) {}
}

/// Remaining bytes where the declared total may only be an estimate from
/// the source. Saturates so a transfer overshooting its estimate reports
/// zero instead of underflowing.
pub fn remaining_of(total: u64, transferred: u64) -> u64 {
    total.saturating_sub(transferred)
}

/// Console progress bar for one transfer.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn bytes(label: &str, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.green/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        Self { bar }
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_chunk(&self, chunk: u64, _remaining: u64, total: u64) {
        // The probe's size hint can disagree with the real content length.
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.inc(chunk);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
