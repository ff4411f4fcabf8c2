// Synthesized titles, descriptions and file names
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::DocInfo;

/// Which parts go into a recreated bookmark's title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TitleStyle {
    /// `title - author - date`
    #[default]
    Full,
    TitleOnly,
    TitleAuthor,
    TitleDate,
}

impl TitleStyle {
    pub const ALL: [TitleStyle; 4] = [
        TitleStyle::Full,
        TitleStyle::TitleOnly,
        TitleStyle::TitleAuthor,
        TitleStyle::TitleDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TitleStyle::Full => "full",
            TitleStyle::TitleOnly => "title-only",
            TitleStyle::TitleAuthor => "title-author",
            TitleStyle::TitleDate => "title-date",
        }
    }
}

impl fmt::Display for TitleStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TitleStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TitleStyle::ALL
            .iter()
            .copied()
            .find(|style| style.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<_> = TitleStyle::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown title style '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

pub fn synthesize_title(doc: &DocInfo, style: TitleStyle) -> String {
    match style {
        TitleStyle::Full => format!("{} - {} - {}", doc.title, doc.owner, doc.date_label()),
        TitleStyle::TitleOnly => doc.title.clone(),
        TitleStyle::TitleAuthor => format!("{} - {}", doc.title, doc.owner),
        TitleStyle::TitleDate => format!("{} - {}", doc.title, doc.date_label()),
    }
}

/// Description for the new bookmark: title and author, date, then a link
/// back. Kept verbatim, since Instapaper shows it as plain text.
pub fn synthesize_description(doc: &DocInfo) -> String {
    format!(
        "{} - {}<br>\n{}<br>\n<a href=\"{}\">{}</a><br>",
        doc.title,
        doc.owner,
        doc.date_label(),
        doc.url,
        doc.url
    )
}

/// The same text as an HTML body, escaped, sent as the bookmark's `content`
pub fn synthesize_content(doc: &DocInfo) -> String {
    let url = html_escape(&doc.url);
    format!(
        "{} - {}<br>\n{}<br>\n<a href=\"{}\">{}</a><br>",
        html_escape(&doc.title),
        html_escape(&doc.owner),
        doc.date_label(),
        url,
        url
    )
}

/// `base` plus a short random hex suffix, e.g. `Reading-3fa9`
pub fn unique_folder_name(base: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &suffix[..4])
}

/// `{title}.docx` with path separators and other unsafe characters replaced
pub fn docx_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim();

    if cleaned.is_empty() {
        "untitled.docx".to_string()
    } else {
        format!("{}.docx", cleaned)
    }
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
