//! Turning raw multi-line element text into discrete items.

/// Split `raw` into one item per line, trimming surrounding whitespace,
/// dropping blank lines, and dropping any line that equals an `exclude`
/// entry ignoring case.
pub fn normalize_lines(raw: &str, exclude: &[String]) -> Vec<String> {
    let excluded: Vec<String> = exclude.iter().map(|entry| entry.to_lowercase()).collect();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !excluded.contains(&line.to_lowercase()))
        .map(str::to_string)
        .collect()
}
