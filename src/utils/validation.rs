use std::path::Path;

use crate::error::{TempMediaError, TempMediaResult};
use crate::models::UploadedFile;

const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    /// Empty list accepts any MIME type
    pub allowed_mimes: Vec<String>,
    pub max_file_size: usize,
}

/// Name and type an upload will be staged under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub original_name: String,
    pub mime_type: String,
    pub size: usize,
}

fn invalid(code: &str, message: impl Into<String>) -> TempMediaError {
    TempMediaError::Validation(format!("{}: {}", code, message.into()))
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> TempMediaResult<()> {
    if size == 0 {
        return Err(invalid("EMPTY_FILE", "File appears to be empty"));
    }
    if size > max_size {
        return Err(invalid(
            "FILE_TOO_LARGE",
            format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                size, max_size
            ),
        ));
    }
    Ok(())
}

/// Parses a Content-Type header value down to its lowercase essence
pub fn normalize_content_type(content_type: &str) -> TempMediaResult<String> {
    let parsed: mime::Mime = content_type
        .trim()
        .parse()
        .map_err(|_| invalid("INVALID_CONTENT_TYPE", format!("'{}'", content_type)))?;
    Ok(parsed.essence_str().to_lowercase())
}

/// Resolves the effective MIME type from magic bytes, falling back to the
/// declared type.
///
/// A sniffed type whose top-level category differs from the declared one is
/// rejected.
pub fn detect_mime_type(data: &[u8], declared: Option<&str>) -> TempMediaResult<String> {
    let declared = declared.map(normalize_content_type).transpose()?;
    let sniffed = infer::get(data).map(|k| k.mime_type().to_string());

    match (sniffed, declared) {
        (Some(sniffed), Some(declared)) => {
            let sniffed_category = sniffed.split('/').next().unwrap_or("");
            let declared_category = declared.split('/').next().unwrap_or("");
            if declared != mime::APPLICATION_OCTET_STREAM.essence_str()
                && sniffed_category != declared_category
            {
                return Err(invalid(
                    "MIME_MISMATCH",
                    format!("declared '{}' but content is '{}'", declared, sniffed),
                ));
            }
            Ok(sniffed)
        }
        (Some(sniffed), None) => Ok(sniffed),
        (None, Some(declared)) => Ok(declared),
        (None, None) => Ok(mime::APPLICATION_OCTET_STREAM.essence_str().to_string()),
    }
}

/// Validates MIME type against allowlist
pub fn validate_mime_type(mime_type: &str, rules: &ValidationRules) -> TempMediaResult<()> {
    if rules.allowed_mimes.is_empty()
        || rules
            .allowed_mimes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    {
        return Ok(());
    }

    Err(invalid(
        "INVALID_MIME_TYPE",
        format!("MIME type '{}' is not allowed", mime_type),
    ))
}

/// Strips path components and reserved characters from a client filename
pub fn sanitize_filename(filename: &str) -> TempMediaResult<String> {
    // Normalize Windows separators so `file_name` sees them as path components
    let unified = filename.replace('\\', "/");
    let name = Path::new(&unified)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim();

    if name.is_empty() {
        return Err(invalid("INVALID_FILENAME", "Filename cannot be empty"));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' => '_',
            c => c,
        })
        .collect();

    let sanitized = if sanitized.len() > MAX_FILENAME_LEN {
        let mut end = MAX_FILENAME_LEN;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(invalid(
            "HIDDEN_FILE",
            "Hidden files (starting with '.') are not allowed",
        ));
    }

    Ok(sanitized)
}

/// Checks if file content appears to be executable
pub fn is_executable_content(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }

    // ELF
    header.starts_with(&[0x7F, 0x45, 0x4C, 0x46])
        // PE/COFF
        || header.starts_with(&[0x4D, 0x5A])
        // Mach-O
        || header.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || header.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || header.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || header.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
        || header.starts_with(b"#!")
}

/// Full validation pipeline for an incoming upload. Nothing is written
/// before this passes.
pub fn validate_upload(
    file: &UploadedFile,
    rules: &ValidationRules,
) -> TempMediaResult<ValidatedUpload> {
    validate_file_size(file.data.len(), rules.max_file_size)?;
    let original_name = sanitize_filename(&file.original_name)?;

    if is_executable_content(&file.data) {
        return Err(invalid(
            "EXECUTABLE_CONTENT",
            "File contains executable content which is not allowed",
        ));
    }

    let mime_type = detect_mime_type(&file.data, file.content_type.as_deref())?;
    validate_mime_type(&mime_type, rules)?;

    Ok(ValidatedUpload {
        original_name,
        mime_type,
        size: file.data.len(),
    })
}
