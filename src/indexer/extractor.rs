use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATOR_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[|\\/\-=_*~.\s]+$").unwrap());

pub fn extract_pdf(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path)
        .with_context(|| format!("Failed to extract PDF text: {}", path.display()))
}

/// Base name of the source document, used for chunk ids and the
/// collection name.
pub fn document_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("No file stem for {}", path.display()))
}

/// Layout extraction leaves decorative rules, page furniture and
/// fragment lines behind. Keep only lines that carry text.
pub fn clean_extracted_text(text: &str) -> String {
    text.lines()
        .filter(|line| is_valid_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_valid_line(line: &str) -> bool {
    let line = line.trim();
    let char_count = line.chars().count();
    if char_count < 5 {
        return false;
    }
    if SEPARATOR_LINE.is_match(line) {
        return false;
    }
    let alnum = line.chars().filter(|c| c.is_alphanumeric()).count();
    alnum as f32 / char_count as f32 >= 0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_lines_are_dropped() {
        let text = "Financial highlights\n----------------\nTotal assets grew by 12% in 2023";
        let cleaned = clean_extracted_text(text);
        assert_eq!(
            cleaned,
            "Financial highlights\nTotal assets grew by 12% in 2023"
        );
    }

    #[test]
    fn test_short_fragments_are_dropped() {
        let text = "ab\nA full sentence about portfolio performance.";
        assert_eq!(
            clean_extracted_text(text),
            "A full sentence about portfolio performance."
        );
    }

    #[test]
    fn test_mostly_symbolic_lines_are_dropped() {
        let text = "** ~~ == || //\nNet income reached SAR 331 billion";
        assert_eq!(
            clean_extracted_text(text),
            "Net income reached SAR 331 billion"
        );
    }

    #[test]
    fn test_arabic_lines_survive() {
        let line = "بلغ إجمالي الأصول المدارة مستوى قياسياً";
        assert_eq!(clean_extracted_text(line), line);
    }

    #[test]
    fn test_document_stem() {
        let stem = document_stem(Path::new("/reports/PIF Annual Report 2021.pdf")).unwrap();
        assert_eq!(stem, "PIF Annual Report 2021");
    }
}
