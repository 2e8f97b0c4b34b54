use anyhow::Result;
use std::path::PathBuf;

pub async fn run(path: PathBuf, name: Option<String>) -> Result<()> {
    let site_name = name.unwrap_or_else(|| "My Blog".to_string());
    let config_path = path.join("jotter.toml");
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    std::fs::create_dir_all(path.join("data"))?;

    let config = format!(
        r#"[site]
title = "{}"
description = "A personal blog"

[server]
host = "127.0.0.1"
port = 3000
# Empty allows any origin.
cors_origins = []
request_timeout_secs = 30

[database]
path = "./data/jotter.db"
pool_size = 10

[posts]
per_page = 10
max_per_page = 100
summary_length = 200
slug_retry_attempts = 3
"#,
        site_name.replace('"', "\\\"")
    );

    std::fs::write(&config_path, config)?;

    tracing::info!("Created new Jotter site at {:?}", path);
    tracing::info!("Run 'jotter migrate' to set up the database");
    tracing::info!("Run 'jotter user add --username <name> --staff' to create an editor");
    tracing::info!("Run 'jotter serve' to start the server");

    Ok(())
}
