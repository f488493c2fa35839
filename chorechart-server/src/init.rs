use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tinytemplate::TinyTemplate;

const CONFIG_TEMPLATE: &str = include_str!("../config.yaml.example");

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("template: {0}")]
    Template(#[from] tinytemplate::error::Error),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Serialize)]
struct ConfigCtx<'a> {
    jwt_secret: &'a str,
    listen_port: u16,
    uploads_dir: &'a str,
}

fn generate_secret() -> String {
    // Two UUIDv4s give 244 random bits
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

pub fn render_default_config(listen_port: u16) -> Result<String, InitError> {
    let secret = generate_secret();
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("config", CONFIG_TEMPLATE)?;
    Ok(tt.render(
        "config",
        &ConfigCtx {
            jwt_secret: &secret,
            listen_port,
            uploads_dir: "uploads",
        },
    )?)
}

/// Returns `false` when the file exists and `force` is not set.
pub fn write_default_config(path: &Path, listen_port: u16, force: bool) -> Result<bool, InitError> {
    if path.exists() && !force {
        return Ok(false);
    }
    let io_err = |source| InitError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let text = render_default_config(listen_port)?;
    fs::write(path, text).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o640));
    }
    Ok(true)
}
