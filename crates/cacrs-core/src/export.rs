//! CSV and JSON exports of cases and findings.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Case, Finding};

/// Separator used to flatten list fields into one cell.
pub const LIST_SEPARATOR: &str = "; ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::InvalidInput(format!("unknown export format: {other}"))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CaseRow<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    status: &'static str,
    category: &'a str,
    tags: String,
    created_by: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindingRow<'a> {
    id: &'a str,
    query: &'a str,
    text: &'a str,
    sources: String,
    saved_at: String,
}

fn write_rows<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::Other(e.to_string()))
}

pub fn cases_to_csv(cases: &[Case]) -> Result<String> {
    write_rows(cases.iter().map(|case| CaseRow {
        id: &case.id,
        title: &case.title,
        description: &case.description,
        status: case.status.as_str(),
        category: &case.category,
        tags: case.tags.join(LIST_SEPARATOR),
        created_by: &case.created_by,
        created_at: case.created_at.to_rfc3339(),
        updated_at: case.updated_at.to_rfc3339(),
    }))
}

pub fn findings_to_csv(findings: &[Finding]) -> Result<String> {
    write_rows(findings.iter().map(|finding| FindingRow {
        id: &finding.id,
        query: &finding.query,
        text: &finding.text,
        sources: finding
            .sources
            .iter()
            .map(|s| s.uri.as_str())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        saved_at: finding.saved_at.to_rfc3339(),
    }))
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Append `.ext` unless the name already ends with it.
pub fn with_extension(file_name: &str, format: ExportFormat) -> String {
    let suffix = format!(".{}", format.extension());
    if file_name.to_ascii_lowercase().ends_with(&suffix) {
        file_name.to_string()
    } else {
        format!("{file_name}{suffix}")
    }
}

/// Render cases in the given format.
pub fn export_cases(cases: &[Case], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => cases_to_csv(cases),
        ExportFormat::Json => to_json(cases),
    }
}

/// Render findings in the given format.
pub fn export_findings(findings: &[Finding], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => findings_to_csv(findings),
        ExportFormat::Json => to_json(findings),
    }
}

/// Write an export next to `path`, fixing the extension. Returns the path written.
pub fn write_export(path: &Path, format: ExportFormat, content: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidInput(format!("not a file path: {}", path.display())))?;
    let target = path.with_file_name(with_extension(&name, format));
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, content)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Dataset;

    #[test]
    fn test_cases_csv_joins_tags() {
        let demo = Dataset::demo();
        let csv = cases_to_csv(&demo.cases).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,title,description,status,category,tags,createdBy,createdAt,updatedAt"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("1,Opération Corbeau Numérique,"));
        assert!(first.contains(",in_progress,Désinformation,réseaux sociaux; ingérence,"));
    }

    #[test]
    fn test_findings_csv_quotes_commas() {
        let demo = Dataset::demo();
        let csv = findings_to_csv(&demo.findings).unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "fin-2");
        assert_eq!(
            &rows[0][3],
            "https://home.treasury.gov/news/press-releases/jy1234"
        );
    }

    #[test]
    fn test_extension_appended_once() {
        assert_eq!(with_extension("dossiers", ExportFormat::Csv), "dossiers.csv");
        assert_eq!(with_extension("dossiers.csv", ExportFormat::Csv), "dossiers.csv");
        assert_eq!(with_extension("findings.csv", ExportFormat::Json), "findings.csv.json");
    }

    #[test]
    fn test_write_export_fixes_extension() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_export(&dir.path().join("out"), ExportFormat::Json, "[]").unwrap();
        assert_eq!(written, dir.path().join("out.json"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "[]");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
