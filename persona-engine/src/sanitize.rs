//! Text cleanup for both stages: harvested intel is stripped of links and
//! URLs before it reaches the persona pass, and synthesized output is
//! stripped of markdown structure because the persona voice is plain
//! conversational prose.

use std::sync::OnceLock;

use regex::Regex;

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("static regex"))
}

fn bare_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("static regex"))
}

fn excess_blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

fn heading_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s+").expect("static regex"))
}

fn bullet_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*[-*•]\s+").expect("static regex"))
}

/// Cleans harvested web intel: markdown links reduced to their label, bare
/// URLs removed, runs of blank lines collapsed.
pub fn sanitize_intel(text: &str) -> String {
    let text = markdown_link().replace_all(text, "$1");
    let text = bare_url().replace_all(&text, "");
    let text = excess_blank_lines().replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Strips markdown structure from generated text: heading and bullet
/// markers, em-dashes, excess blank lines.
pub fn strip_structural_noise(text: &str) -> String {
    let text = heading_marker().replace_all(text, "");
    let text = bullet_marker().replace_all(&text, "");
    let text = excess_blank_lines().replace_all(&text, "\n\n");
    text.replace('\u{2014}', "-").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intel_links_reduce_to_labels() {
        assert_eq!(
            sanitize_intel("see [the report](https://example.com/r) for data"),
            "see the report for data"
        );
    }

    #[test]
    fn intel_bare_urls_removed() {
        assert_eq!(
            sanitize_intel("source: https://example.com/page today"),
            "source:  today"
        );
    }

    #[test]
    fn intel_blank_lines_collapsed() {
        assert_eq!(sanitize_intel("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn noise_strips_headings_and_bullets() {
        let input = "## Summary\n- first\n* second\n• third\nplain";
        assert_eq!(
            strip_structural_noise(input),
            "Summary\nfirst\nsecond\nthird\nplain"
        );
    }

    #[test]
    fn noise_replaces_em_dashes() {
        assert_eq!(strip_structural_noise("risk\u{2014}reward"), "risk-reward");
    }
}
