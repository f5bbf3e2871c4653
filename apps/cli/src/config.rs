use std::fs;
use std::path::{Path, PathBuf};

use finsight_client::ClientConfig;

const CONFIG_DIR_NAME: &str = "finsight";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: ClientConfig,
    pub paths: ConfigPaths,
    pub created: bool,
}

impl ConfigLoad {
    /// Applies `FINSIGHT_API_URL`, then the `--api-url` flag. Neither is
    /// written back to the file.
    pub fn apply_overrides(&mut self, api_url: Option<&str>) {
        self.config.apply_env();
        if let Some(url) = api_url.map(str::trim).filter(|url| !url.is_empty()) {
            self.config.api_url = url.to_string();
        }
    }
}

pub fn load_or_create() -> Result<ConfigLoad, String> {
    load_or_create_in(&config_dir()?)
}

pub fn load_or_create_in(dir: &Path) -> Result<ConfigLoad, String> {
    fs::create_dir_all(dir)
        .map_err(|err| format!("create config dir {}: {}", dir.display(), err))?;
    let paths = ConfigPaths {
        file: dir.join(CONFIG_FILE_NAME),
    };

    if paths.file.exists() {
        let contents = fs::read_to_string(&paths.file)
            .map_err(|err| format!("read config {}: {}", paths.file.display(), err))?;
        let config: ClientConfig = toml::from_str(&contents)
            .map_err(|err| format!("parse config {}: {}", paths.file.display(), err))?;
        return Ok(ConfigLoad {
            config,
            paths,
            created: false,
        });
    }

    let config = ClientConfig::default();
    let contents =
        toml::to_string_pretty(&config).map_err(|err| format!("serialize config: {}", err))?;
    fs::write(&paths.file, contents)
        .map_err(|err| format!("write config {}: {}", paths.file.display(), err))?;

    Ok(ConfigLoad {
        config,
        paths,
        created: true,
    })
}

fn config_dir() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME")
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir).join(CONFIG_DIR_NAME));
    }
    let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
    Ok(PathBuf::from(home).join(".config").join(CONFIG_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use finsight_client::VerifyMode;

    use super::*;

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");

        let first = load_or_create_in(dir.path()).expect("create");
        let second = load_or_create_in(dir.path()).expect("load");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.config, ClientConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "api_url = \"https://api.example.com\"\nverify_mode = \"blocking\"\n",
        )
        .expect("write");

        let load = load_or_create_in(dir.path()).expect("load");

        assert_eq!(load.config.api_url, "https://api.example.com");
        assert_eq!(load.config.verify_mode, VerifyMode::Blocking);
        assert_eq!(load.config.stale_after_secs, 30);
    }

    #[test]
    fn flag_wins_over_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut load = load_or_create_in(dir.path()).expect("create");

        load.apply_overrides(Some(" http://127.0.0.1:9999 "));

        assert_eq!(load.config.api_url, "http://127.0.0.1:9999");
    }
}
