use regex::Regex;
use tracing::debug;

use crate::config::Config;

/// Value of the first `label: value` line in `lines`. The label matches
/// case-insensitively and literally; the value has surrounding whitespace removed.
pub fn extract_value_after_colon(lines: &[String], label: &str) -> Option<String> {
    let pattern = format!(r"(?i)^{}\s*:\s*(.+?)\s*$", regex::escape(label));
    let re = Regex::new(&pattern).ok()?;
    lines
        .iter()
        .find_map(|line| re.captures(line).map(|c| c[1].trim().to_string()))
}

/// The addressee's name: first non-blank line without a colon that isn't a
/// header or a skipped prefix. A leading honorific (`Herr`, `Frau`, `Firma`)
/// is usual but not required.
pub fn extract_first_person_name(lines: &[String], config: &Config) -> Option<String> {
    for line in lines {
        if line.is_empty() || line.contains(':') || config.is_header(line) {
            continue;
        }
        let lower = line.to_lowercase();
        if config
            .name_skip_prefixes
            .iter()
            .any(|p| lower.starts_with(&p.to_lowercase()))
        {
            continue;
        }

        debug!(name = %line, "name line picked");
        return Some(line.trim().to_string());
    }
    None
}
