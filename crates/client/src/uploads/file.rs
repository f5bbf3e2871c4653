use std::path::Path;

use crate::error::{ClientError, Result};

/// What a workflow accepts; decides which extensions are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Spreadsheet,
    ReceiptImage,
}

impl UploadKind {
    fn content_type(self, extension: &str) -> Option<&'static str> {
        match (self, extension) {
            (UploadKind::Spreadsheet, "xlsx") => {
                Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
            }
            (UploadKind::Spreadsheet, "xls") => Some("application/vnd.ms-excel"),
            (UploadKind::ReceiptImage, "jpg" | "jpeg") => Some("image/jpeg"),
            (UploadKind::ReceiptImage, "png") => Some("image/png"),
            (UploadKind::ReceiptImage, "webp") => Some("image/webp"),
            _ => None,
        }
    }

    fn accepted(self) -> &'static str {
        match self {
            UploadKind::Spreadsheet => ".xlsx, .xls",
            UploadKind::ReceiptImage => ".jpg, .jpeg, .png, .webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, rejecting extensions `kind` does not accept
    /// before anything is sent.
    pub fn from_path(path: &Path, kind: UploadKind) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::Validation(format!("invalid file path {}", path.display())))?
            .to_string();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let content_type = kind.content_type(&extension).ok_or_else(|| {
            ClientError::Validation(format!(
                "unsupported file {}; expected one of {}",
                file_name,
                kind.accepted()
            ))
        })?;
        let bytes = std::fs::read(path)?;
        Ok(Self::new(file_name, content_type, bytes))
    }
}
