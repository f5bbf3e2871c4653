use std::path::PathBuf;

const DATA_DIR_NAME: &str = "finsight";
const DATA_DIR_ENV: &str = "FINSIGHT_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDirResolution {
    pub dir: PathBuf,
    pub from_env: bool,
}

/// `FINSIGHT_DATA_DIR`, else `$XDG_DATA_HOME/finsight`, else
/// `~/.local/share/finsight`.
pub fn resolve_data_dir() -> Result<DataDirResolution, String> {
    if let Some(dir) = non_empty_var(DATA_DIR_ENV) {
        return Ok(DataDirResolution {
            dir: PathBuf::from(dir),
            from_env: true,
        });
    }
    let base = match non_empty_var("XDG_DATA_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
            PathBuf::from(home).join(".local").join("share")
        }
    };
    Ok(DataDirResolution {
        dir: base.join(DATA_DIR_NAME),
        from_env: false,
    })
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
