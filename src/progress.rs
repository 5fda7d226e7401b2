use indicatif::{ProgressBar, ProgressStyle};

pub fn progress_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} eta {eta} {msg}",
        )
        .expect("valid bar template")
        .progress_chars("##-"),
    );
    pb.set_prefix(label.to_string());
    pb
}
