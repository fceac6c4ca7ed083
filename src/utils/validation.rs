use crate::utils::error::{AnalyzerError, Result};
use std::path::Path;
use url::Url;

/// Upper bound for `[document].max_size_mb`.
pub const MAX_DOCUMENT_MB: u64 = 512;

const BYTES_PER_MB: u64 = 1024 * 1024;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> AnalyzerError {
    AnalyzerError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// The API root, e.g. `https://api.anthropic.com`. The client appends
/// `/v1/messages` itself, so a base URL that already names the endpoint
/// would request `/v1/messages/v1/messages`.
pub fn validate_base_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            ))
        }
    }
    if url.host_str().is_none() {
        return Err(invalid(field_name, url_str, "URL has no host"));
    }
    if url.path().trim_end_matches('/').ends_with("/v1/messages") {
        return Err(invalid(
            field_name,
            url_str,
            "use the API root; /v1/messages is appended per request",
        ));
    }
    Ok(())
}

/// Reports are written below this directory, so it may not exist yet but
/// must not be a regular file.
pub fn validate_output_dir(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    if Path::new(path).is_file() {
        return Err(invalid(field_name, path, "Path is a file, expected a directory"));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// Checks a document size limit given in MiB and returns it in bytes.
pub fn document_limit_bytes(field_name: &str, megabytes: u64) -> Result<u64> {
    validate_range(field_name, megabytes, 1, MAX_DOCUMENT_MB)?;
    megabytes
        .checked_mul(BYTES_PER_MB)
        .ok_or_else(|| invalid(field_name, megabytes, "Value is too large"))
}

/// Checks a document size limit already held in bytes.
pub fn validate_document_limit(field_name: &str, bytes: u64) -> Result<()> {
    if bytes == 0 || bytes > MAX_DOCUMENT_MB * BYTES_PER_MB {
        return Err(invalid(
            field_name,
            format!("{} bytes", bytes),
            format!("Limit must be between 1 byte and {} MiB", MAX_DOCUMENT_MB),
        ));
    }
    Ok(())
}

pub fn validate_one_of(field_name: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(invalid(
        field_name,
        value,
        format!("Allowed values: {}", allowed.join(", ")),
    ))
}
