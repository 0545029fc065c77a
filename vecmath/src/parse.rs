use crate::VecMathError;

/// Parses an embedding from its stored text form.
///
/// Accepts a bracketed, comma-separated list (`[0.1, -0.2]`) or plain
/// whitespace-separated values (`0.1 -0.2`).
pub fn parse_embedding(text: &str) -> Result<Vec<f32>, VecMathError> {
    let text = text.trim();
    let malformed = || {
        let head: String = text.chars().take(50).collect();
        VecMathError::MalformedEmbedding(format!("{head}..."))
    };

    if let Some(inner) = text.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(malformed)?;
        if inner.trim().is_empty() {
            return Ok(Vec::new());
        }
        return inner
            .split(',')
            .map(|s| s.trim().parse::<f32>().map_err(|_| malformed()))
            .collect();
    }

    text.split_whitespace()
        .map(|s| s.parse::<f32>().map_err(|_| malformed()))
        .collect()
}

/// Formats an embedding as `[a,b,c]`, the form [`parse_embedding`] reads.
pub fn format_embedding(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}
