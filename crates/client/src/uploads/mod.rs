mod file;
mod import;
mod receipt;

pub use file::{UploadFile, UploadKind};
pub use import::{BulkImport, ImportState};
pub use receipt::{
    DEFAULT_CATEGORY, DEFAULT_DESCRIPTION, ReceiptReview, ReceiptScan, ReceiptState,
};
