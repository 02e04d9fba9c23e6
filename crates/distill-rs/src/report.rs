//! Terminal rendering of the finished summary.

use std::path::Path;

pub const REPORT_WIDTH: usize = 100;

/// Greedy word wrap at `width` columns. Existing line breaks are kept and
/// words longer than a line are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_len = 0;

        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();

            if line_len > 0 && line_len + 1 + chars.len() <= width {
                line.push(' ');
                line.extend(chars.iter());
                line_len += 1 + chars.len();
                continue;
            }
            if line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            while chars.len() > width {
                let rest = chars.split_off(width);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }
            line.extend(chars.iter());
            line_len = chars.len();
        }

        if line_len > 0 || paragraph.trim().is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// The summary framed by a titled rule, followed by where it was saved.
pub fn render_summary(text: &str, token_count: usize, location: &Path) -> String {
    let title = format!(" SUMMARY ({token_count} tokens) ");
    let mut out = format!("{title:-^width$}\n", width = REPORT_WIDTH);
    for line in wrap(text, REPORT_WIDTH) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&"-".repeat(REPORT_WIDTH));
    out.push('\n');
    out.push_str(&format!("Summary saved to {}\n", location.display()));
    out
}
