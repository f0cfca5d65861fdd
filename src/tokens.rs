use crate::log_debug;
use std::sync::LazyLock;
use tiktoken_rs::{CoreBPE, cl100k_base};

// Loading the BPE ranks is expensive; share one encoder per process.
static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match cl100k_base() {
    Ok(encoder) => Some(encoder),
    Err(e) => {
        log_debug!("Token encoder unavailable, falling back to estimates: {}", e);
        None
    }
});

const ELLIPSIS: &str = "…";

/// Count the tokens in a string (cl100k; roughly 4 chars per token without the encoder)
pub fn count_tokens(s: &str) -> usize {
    ENCODER.as_ref().map_or_else(
        || s.chars().count().div_ceil(4),
        |encoder| encoder.encode_ordinary(s).len(),
    )
}

/// Truncate a string to fit within the specified token limit
pub fn truncate_to_tokens(s: &str, max_tokens: usize) -> String {
    let Some(encoder) = ENCODER.as_ref() else {
        let max_chars = max_tokens.saturating_mul(4);
        if s.chars().count() <= max_chars {
            return s.to_string();
        }
        let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        out.push_str(ELLIPSIS);
        return out;
    };

    let tokens = encoder.encode_ordinary(s);
    if tokens.len() <= max_tokens {
        return s.to_string();
    }

    log_debug!(
        "Truncating document from {} tokens to {} tokens",
        tokens.len(),
        max_tokens
    );

    // Reserve space for the ellipsis
    let keep = max_tokens.saturating_sub(1);
    let mut truncated = tokens.get(..keep).map(<[_]>::to_vec).unwrap_or_default();
    truncated.extend(encoder.encode_ordinary(ELLIPSIS));

    encoder.decode(truncated).unwrap_or_else(|e| {
        log_debug!("Token decode failed ({}), truncating by characters", e);
        let mut out: String = s.chars().take(keep.saturating_mul(4)).collect();
        out.push_str(ELLIPSIS);
        out
    })
}
