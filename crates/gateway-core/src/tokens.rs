//! Token estimation.

/// Estimate the token count of `text` as `ceil(words * 1.3)`.
///
/// Words are whitespace-separated runs. The estimate is deliberately
/// coarse; it is only used for admission checks and as a fallback when the
/// provider reports no usage.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count() as u64;
    let tokens = (words * 13).div_ceil(10);
    u32::try_from(tokens).unwrap_or(u32::MAX)
}
