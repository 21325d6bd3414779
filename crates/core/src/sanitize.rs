/// Maps path-hostile characters inside a substituted value to `_`.
/// Separators in a template's literal text keep their meaning; the same
/// characters inside a value must not, so `/` and `\` are mapped too.
pub fn sanitize_value(value: &str) -> String {
    value
        .chars()
        .map(|ch| if is_portable(ch) { ch } else { '_' })
        .collect()
}

/// Makes one destination path segment safe on common filesystems: hostile
/// characters become `_`, surrounding whitespace and trailing dots are
/// dropped, and Windows device names get a suffix so they stay usable.
pub fn sanitize_segment(value: &str) -> String {
    let cleaned = sanitize_value(value);
    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);

    if trimmed.is_empty() {
        return "untitled".to_string();
    }
    if reserved_on_windows(trimmed) {
        return format!("{trimmed}_file");
    }
    trimmed.to_string()
}

fn is_portable(ch: char) -> bool {
    !ch.is_control() && !matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

/// Windows reserves the classic DOS device names, bare or with any
/// extension: CON, PRN, AUX, NUL, and the numbered COM/LPT ports.
fn reserved_on_windows(value: &str) -> bool {
    let stem = value.split('.').next().unwrap_or(value).to_ascii_uppercase();
    matches!(stem.as_str(), "CON" | "PRN" | "AUX" | "NUL") || is_numbered_device(&stem)
}

fn is_numbered_device(stem: &str) -> bool {
    if stem.len() != 4 {
        return false;
    }
    let (prefix, number) = stem.split_at(3);
    (prefix == "COM" || prefix == "LPT") && matches!(number.as_bytes()[0], b'1'..=b'9')
}
