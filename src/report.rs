use crate::diff_tree::DiffTree;
use crate::strategy::FileState;

/// One line per change: the change log symbol, then the relative path.
pub fn format_changes(tree: &DiffTree) -> Vec<String> {
    tree.flatten()
        .into_iter()
        .map(|(path, entry)| format!("{} {}", entry.kind().symbol(), path))
        .collect()
}

pub fn print_changes(tree: &DiffTree) {
    for line in format_changes(tree) {
        println!("{line}");
    }
}

/// Human-readable rendering of an archived state.
pub fn format_state(state: &FileState) -> String {
    match state {
        FileState::ModTime(seconds) => {
            format!("mtime {} ({})", state.to_log_text(), format_mtime(*seconds))
        }
        FileState::Digest(hex) => format!("digest {hex}"),
        FileState::Content(bytes) => format!(
            "content ({}): {}",
            format_size(bytes.len() as u64),
            truncate(&state.to_log_text())
        ),
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_mtime(seconds: f64) -> String {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;

    match chrono::DateTime::from_timestamp(whole as i64, nanos) {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => "out of range".to_string(),
    }
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 48;
    match text.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
