use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::parser::Extraction;

/// Plain-text report: each found section as its title followed by `- Label: Value`
/// bullets and a blank line, in configured header order.
pub fn format_as_txt(extraction: &Extraction, config: &Config) -> String {
    let mut parts: Vec<String> = Vec::new();
    for header in &config.headers {
        let Some(fields) = extraction.section(header) else {
            continue;
        };
        parts.push(header.clone());
        parts.extend(fields.iter().map(|f| format!("- {}", f)));
        parts.push(String::new());
    }
    format!("{}\n", parts.join("\n").trim())
}

/// `<stem>_extracted.txt`. The caller picks the directory.
pub fn report_file_name(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    PathBuf::from(format!("{}_extracted.txt", stem))
}

/// Write `txt` as the report for `source`, into `out_dir` (created if missing)
/// or next to the source.
pub fn write_report(source: &Path, out_dir: Option<&Path>, txt: &str) -> Result<PathBuf> {
    let dir = match out_dir {
        Some(d) => {
            std::fs::create_dir_all(d)
                .with_context(|| format!("Failed to create {}", d.display()))?;
            d.to_path_buf()
        }
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let target = dir.join(report_file_name(source));
    std::fs::write(&target, txt.as_bytes())
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(target)
}
