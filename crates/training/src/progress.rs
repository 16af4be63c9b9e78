use indicatif::{ProgressBar, ProgressStyle};

/// Bar for one pass over a split; a spinner when the length is unknown.
pub fn loop_bar(len: Option<usize>, desc: &'static str) -> ProgressBar {
    match len {
        Some(n) => {
            let bar = ProgressBar::new(n as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} {bar:30.green/white} {pos}/{len} steps [{elapsed_precise}]")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(desc);
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} {pos} steps")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_message(desc);
            bar
        }
    }
}
