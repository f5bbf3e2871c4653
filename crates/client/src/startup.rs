use std::path::PathBuf;

use crate::Result;

const CREDENTIAL_FILE_NAME: &str = "credential";

#[derive(Clone, Debug)]
pub struct ClientPaths {
    pub data_dir: PathBuf,
    pub credential_path: PathBuf,
}

impl ClientPaths {
    pub fn new(data_dir: PathBuf) -> Self {
        let credential_path = data_dir.join(CREDENTIAL_FILE_NAME);
        Self {
            data_dir,
            credential_path,
        }
    }
}

pub fn ensure_data_dir(paths: &ClientPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.data_dir)?;
    Ok(())
}
