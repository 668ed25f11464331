/// Rough token estimate for prompt diagnostics.
/// English prose averages ~1.3 tokens per word, plus a small formatting overhead.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();
    ((words as f64 * 1.3) + 5.0).ceil() as usize
}
