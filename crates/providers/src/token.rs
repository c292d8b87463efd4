//! Token estimation for the request diagnostics view.
//!
//! CJK characters cost roughly 1.8 tokens each; everything else about a third
//! of a token. Rounded up. Never used for truncation.

const CJK_WEIGHT: f64 = 1.8;
const OTHER_WEIGHT: f64 = 0.35;

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FA5}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) { (cjk + 1, other) } else { (cjk, other + 1) }
    });
    (cjk as f64 * CJK_WEIGHT + other as f64 * OTHER_WEIGHT).ceil() as usize
}
