pub mod app;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod mutations;
pub mod services;
pub mod session;
pub mod startup;
pub mod transport;
pub mod uploads;
pub mod util;

pub use app::ClientState;
pub use cache::{Query, QueryCache, QueryKey, QuerySnapshot, QueryState};
pub use config::ClientConfig;
pub use error::{ClientError, Result, normalize_error_message};
pub use mutations::{MutationCoordinator, SubmitControl, TransactionForm};
pub use services::ApiServices;
pub use session::{Bootstrap, Credential, SessionManager, SessionState, VerifyMode};
pub use startup::{ClientPaths, ensure_data_dir};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, SharedTransport, Transport};
pub use uploads::{BulkImport, ReceiptScan, UploadFile, UploadKind};
