use crate::SearchResult;

/// Formats search results as prompt context.
///
/// Plain entry text with optional date and situational suffixes, separated
/// by blank lines. No headers and no meta-instructions: the block has to
/// read as unprompted first-person memory, not as an inserted document.
pub fn format_context(results: &[SearchResult]) -> String {
    let entries: Vec<String> = results
        .iter()
        .map(|r| {
            let mut text = r.entry.content.clone();
            if let Some(date) = &r.entry.date {
                text.push_str(&format!(" ({date})"));
            }
            if let Some(context) = &r.entry.context {
                text.push_str(&format!(" — {context}"));
            }
            text
        })
        .collect();

    entries.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KnowledgeEntry;

    fn entry(content: &str, date: Option<&str>, context: Option<&str>) -> SearchResult {
        SearchResult {
            entry: KnowledgeEntry {
                id: "e1".into(),
                category: "events".into(),
                content: content.into(),
                date: date.map(String::from),
                source: "test".into(),
                source_type: "event".into(),
                keywords: vec![],
                context: context.map(String::from),
                embedding: vec![1.0],
            },
            score: 0.9,
        }
    }

    #[test]
    fn formats_plain_content() {
        let out = format_context(&[entry("I lived in Belize.", None, None)]);
        assert_eq!(out, "I lived in Belize.");
    }

    #[test]
    fn appends_date_and_context() {
        let out = format_context(&[entry("I ran for president.", Some("2016"), Some("campaign"))]);
        assert_eq!(out, "I ran for president. (2016) — campaign");
    }

    #[test]
    fn joins_entries_with_blank_lines() {
        let out = format_context(&[entry("one", None, None), entry("two", None, None)]);
        assert_eq!(out, "one\n\ntwo");
    }

    #[test]
    fn empty_results_format_empty() {
        assert_eq!(format_context(&[]), "");
    }
}
