//! Transfer progress display for uploads

use std::io::Read;

use indicatif::{ProgressBar, ProgressBarIter, ProgressDrawTarget, ProgressStyle};

/// Create a byte progress bar for a transfer of `size` bytes.
///
/// Draws to stderr, which indicatif leaves blank when it is not a terminal.
/// With `quiet` the bar is hidden entirely.
pub(crate) fn transfer_bar(size: u64, quiet: bool) -> ProgressBar {
    let pb = ProgressBar::new(size);
    if quiet {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_draw_target(ProgressDrawTarget::stderr());
    }
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb
}

/// Wrap `reader` so bytes read through it advance `pb`.
///
/// The returned reader yields exactly the bytes of `reader`, in order.
pub(crate) fn wrap_read<R: Read>(pb: &ProgressBar, reader: R) -> ProgressBarIter<R> {
    pb.wrap_read(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_read_is_transparent() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let pb = transfer_bar(data.len() as u64, true);
        let mut r = wrap_read(&pb, data.as_slice());
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(pb.position(), data.len() as u64);
    }
}
