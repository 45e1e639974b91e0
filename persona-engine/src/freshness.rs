//! Freshness classifier: decides whether a query likely needs live data
//! rather than static knowledge.
//!
//! Deliberately cheap: a case-insensitive substring match against a fixed
//! vocabulary. False positives and negatives are acceptable; the downstream
//! choice (search vs cache) is cheap to reverse per request.

/// Temporal, market, and weather indicative terms. Heuristic vocabulary,
/// tunable rather than load-bearing.
pub const FRESH_KEYWORDS: [&str; 17] = [
    "today",
    "tonight",
    "now",
    "current",
    "latest",
    "news",
    "price",
    "market",
    "update",
    "recent",
    "trend",
    "breaking",
    "live",
    "weather",
    "forecast",
    "humidity",
    "temperature",
];

/// True when the text mentions any freshness-indicative term.
pub fn needs_fresh_answer(input: &str) -> bool {
    if input.is_empty() {
        return false;
    }
    let normalized = input.to_lowercase();
    FRESH_KEYWORDS
        .iter()
        .any(|keyword| normalized.contains(keyword))
}
