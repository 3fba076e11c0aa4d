use std::path::Path;

use anyhow::{bail, Context};
use cilprobe::rewriter::Method;

/// Read and decode a raw method body.
pub fn load_method(path: &Path) -> anyhow::Result<(Vec<u8>, Method)> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read body: {}", path.display()))?;
    let method = Method::decode(&data)
        .with_context(|| format!("failed to decode method body: {}", path.display()))?;
    Ok((data, method))
}

/// Parse a number given as hex (`0x1a`) or decimal.
pub fn parse_number(text: &str) -> anyhow::Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid number '{text}'"))
}

/// Parse a metadata token given as hex or decimal.
pub fn parse_token(text: &str) -> anyhow::Result<u32> {
    let value = parse_number(text)?;
    match u32::try_from(value) {
        Ok(token) => Ok(token),
        Err(_) => bail!("token '{text}' does not fit in 32 bits"),
    }
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
