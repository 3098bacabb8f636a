//! CSV export of crawl output and import of identifiers.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::ExportError;
use crate::models::DiscoveredProfile;

pub const PROFILES_HEADER: &str = "name,url,location";

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Render profiles as CSV with a header row.
pub fn profiles_to_csv(profiles: &[DiscoveredProfile]) -> String {
    let mut output = Vec::new();
    writeln!(output, "{}", PROFILES_HEADER).ok();
    for profile in profiles {
        writeln!(
            output,
            "{},{},{}",
            escape_csv(&profile.name),
            escape_csv(&profile.url),
            escape_csv(&profile.location)
        )
        .ok();
    }
    String::from_utf8_lossy(&output).into_owned()
}

/// Write profiles to `path`, creating parent directories.
pub fn write_profiles_csv(path: &Path, profiles: &[DiscoveredProfile]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    fs::write(path, profiles_to_csv(profiles)).map_err(|e| io_error(path, e))
}

/// Split one CSV record, honoring quotes and doubled quotes.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Values of the `URL` column (header matched case-insensitively), in file
/// order. Blank values are skipped.
pub fn parse_url_column(content: &str) -> Result<Vec<String>, ExportError> {
    let mut lines = content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty());

    let header = lines.next().ok_or(ExportError::Empty)?;
    let columns: Vec<String> = split_record(header.trim_start_matches('\u{feff}'))
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();
    let index = columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case("url"))
        .ok_or_else(|| ExportError::MissingUrlColumn(columns.clone()))?;

    Ok(lines
        .filter_map(|line| split_record(line).into_iter().nth(index))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}

/// Read the `URL` column of a CSV file.
pub fn read_url_column(path: &Path) -> Result<Vec<String>, ExportError> {
    let content = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    parse_url_column(&content)
}
