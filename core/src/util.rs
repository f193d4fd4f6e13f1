//! Shared validation helpers for endpoints and bearer tokens

use anyhow::{bail, Context, Result};

/// Reject values that cannot travel in an HTTP header
///
/// Control characters (0x00-0x1F), DEL, and line breaks are refused.
pub fn sanitize_for_header(value: &str, field_name: &str) -> Result<String> {
    if value.is_empty() {
        bail!("{} cannot be empty", field_name);
    }

    for (index, ch) in value.char_indices() {
        if ch.is_ascii_control() {
            bail!(
                "{} contains invalid character at position {} (byte value: {:#04x}). \
                Control characters, newlines, carriage returns, and null bytes are not allowed.",
                field_name,
                index,
                ch as u32
            );
        }
    }

    Ok(value.to_string())
}

/// Validate a wallet bearer token
///
/// Returns the trimmed token once it is known to form a valid
/// `Authorization: Bearer ...` header.
pub fn validate_api_key(token: &str) -> Result<String> {
    let trimmed = token.trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        bail!("token is empty or set to 'none'");
    }

    sanitize_for_header(trimmed, "token")?;

    let header_value = format!("Bearer {}", trimmed);
    header_value
        .parse::<reqwest::header::HeaderValue>()
        .with_context(|| format!("token does not form a valid Authorization header ({} characters)", trimmed.len()))?;

    Ok(trimmed.to_string())
}

/// Validate an RPC or wallet service base URL
///
/// Double-encoded URLs are refused, since they usually mean the value went
/// through a shell or template twice.
pub fn sanitize_base_url(url: &str, field_name: &str) -> Result<String> {
    let trimmed = url.trim();

    if trimmed.is_empty() {
        bail!("{} cannot be empty", field_name);
    }

    if trimmed.contains("%2F") || trimmed.contains("%3D") || trimmed.contains("%20") {
        bail!(
            "{} appears to contain URL-encoded characters (e.g., %2F, %3D, %20). \
            Please verify the URL is not double-encoded.",
            field_name
        );
    }

    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        bail!("{} must start with 'http://' or 'https://'. Got: {}", field_name, trimmed);
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Show only the edges of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}…{}", head, tail)
}
