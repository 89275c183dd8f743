use crate::error::{ParcelError, Result};
use crate::formats::FormatValidation;

pub struct FormatValidator;

const BYTES_PER_MB: u64 = 1024 * 1024;

impl FormatValidator {
    /// Reject uploads over the configured size limit
    pub fn check_upload_size(len: usize, max_mb: u64) -> Result<()> {
        let len = len as u64;
        if len > max_mb.saturating_mul(BYTES_PER_MB) {
            return Err(ParcelError::FileTooLarge {
                size_mb: len.div_ceil(BYTES_PER_MB),
                max_mb,
            });
        }
        Ok(())
    }

    /// Validate upload size is within limits
    pub fn validate_size(len: usize, max_mb: u64) -> FormatValidation {
        let mut validation = FormatValidation::default();

        if len == 0 {
            validation.errors.push("File is empty".to_string());
            return validation;
        }

        let size_mb = len as u64 / BYTES_PER_MB;
        if let Err(e) = Self::check_upload_size(len, max_mb) {
            validation.errors.push(e.to_string());
        } else if size_mb > max_mb / 2 {
            validation
                .warnings
                .push(format!("Large file ({} MB) may take longer to process", size_mb));
        }

        validation
    }

    /// Validate that a text file is valid UTF-8
    pub fn validate_utf8(bytes: &[u8]) -> FormatValidation {
        let mut validation = FormatValidation::default();

        if let Err(e) = std::str::from_utf8(bytes) {
            validation.errors.push(format!("File is not valid UTF-8: {}", e));
        }

        validation
    }

    /// Validate XML structure by attempting to parse
    pub fn validate_xml_structure(bytes: &[u8]) -> FormatValidation {
        let mut validation = FormatValidation::default();

        use quick_xml::Reader;
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => {
                    validation.errors.push(format!("Invalid XML structure: {}", e));
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        validation
    }

    /// Validate JSON structure by attempting to parse
    pub fn validate_json_structure(bytes: &[u8]) -> FormatValidation {
        let mut validation = FormatValidation::default();

        if let Err(e) = serde_json::from_slice::<serde_json::Value>(bytes) {
            validation.errors.push(format!("Invalid JSON structure: {}", e));
        }

        validation
    }

    /// Validate that the bytes open as a ZIP archive
    pub fn validate_zip_structure(bytes: &[u8]) -> FormatValidation {
        let mut validation = FormatValidation::default();

        match zip::ZipArchive::new(std::io::Cursor::new(bytes)) {
            Ok(archive) if archive.len() == 0 => {
                validation.errors.push("Archive contains no files".to_string());
            }
            Ok(_) => {}
            Err(e) => validation.errors.push(format!("Invalid ZIP archive: {}", e)),
        }

        validation
    }

    /// Merge multiple validation results
    pub fn merge_validations(validations: Vec<FormatValidation>) -> FormatValidation {
        let mut merged = FormatValidation::default();

        for validation in validations {
            merged.errors.extend(validation.errors);
            merged.warnings.extend(validation.warnings);
        }

        merged
    }

    /// Convert a validation result to a Result type
    pub fn validation_to_result(validation: &FormatValidation, format_name: &str) -> Result<()> {
        if !validation.is_valid() {
            Err(ParcelError::CorruptFile {
                format: format_name.to_string(),
                reason: validation.errors.join("; "),
            })
        } else {
            Ok(())
        }
    }
}
