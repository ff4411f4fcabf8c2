use crate::{models::DocInfo, Error, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "md" | "markdown" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }
}

/// Exporter for the sorted document list
pub struct Exporter;

impl Exporter {
    /// Export docs to a file, picking the format from the extension
    pub fn export_to_file<P: AsRef<Path>>(docs: &[DocInfo], path: P) -> Result<()> {
        let path = path.as_ref();

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ExportFormat::from_extension)
            .ok_or_else(|| {
                Error::ExportError(
                    "Could not determine export format from extension. Use .json, .csv, or .md"
                        .to_string(),
                )
            })?;

        Self::export_to_file_with_format(docs, path, format)
    }

    pub fn export_to_file_with_format<P: AsRef<Path>>(
        docs: &[DocInfo],
        path: P,
        format: ExportFormat,
    ) -> Result<()> {
        let content = match format {
            ExportFormat::Json => Self::to_json(docs)?,
            ExportFormat::Csv => Self::to_csv(docs),
            ExportFormat::Markdown => Self::to_markdown(docs),
        };

        let mut file = File::create(path)
            .map_err(|e| Error::ExportError(format!("Failed to create file: {}", e)))?;

        file.write_all(content.as_bytes())
            .map_err(|e| Error::ExportError(format!("Failed to write file: {}", e)))?;

        Ok(())
    }

    pub fn to_json(docs: &[DocInfo]) -> Result<String> {
        serde_json::to_string_pretty(docs)
            .map_err(|e| Error::ExportError(format!("Failed to serialize JSON: {}", e)))
    }

    pub fn to_csv(docs: &[DocInfo]) -> String {
        let mut output = String::new();

        output.push_str("Date,Title,Owner,Bookmark Title,Document ID,URL\n");

        for doc in docs {
            output.push_str(&format!(
                "{},{},{},{},{},{}\n",
                doc.date_label(),
                Self::escape_csv(&doc.title),
                Self::escape_csv(&doc.owner),
                Self::escape_csv(&doc.bookmark_title),
                doc.doc_id,
                Self::escape_csv(&doc.url),
            ));
        }

        output
    }

    pub fn to_markdown(docs: &[DocInfo]) -> String {
        let mut output = String::new();

        output.push_str("# Google Docs by date\n\n");
        output.push_str(&format!("Total documents: {}\n\n", docs.len()));

        if docs.is_empty() {
            return output;
        }

        output.push_str("| Date | Title | Owner |\n");
        output.push_str("|------|-------|-------|\n");
        for doc in docs {
            output.push_str(&format!(
                "| {} | [{}]({}) | {} |\n",
                doc.date_label(),
                Self::escape_markdown(&doc.title),
                doc.url,
                Self::escape_markdown(&doc.owner),
            ));
        }

        // Owners with the most documents first
        let mut owner_counts: Vec<(String, usize)> = Vec::new();
        for doc in docs {
            match owner_counts.iter_mut().find(|(owner, _)| *owner == doc.owner) {
                Some((_, count)) => *count += 1,
                None => owner_counts.push((doc.owner.clone(), 1)),
            }
        }
        owner_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        output.push_str("\n## Owners\n\n");
        for (owner, count) in owner_counts {
            output.push_str(&format!("- {}: {}\n", owner, count));
        }

        output
    }

    /// Escape CSV special characters
    fn escape_csv(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }

    /// Pipes would end the table cell
    fn escape_markdown(s: &str) -> String {
        s.replace('|', "\\|")
    }
}
