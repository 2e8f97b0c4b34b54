use crate::{services::auth, Config, Database};
use anyhow::Result;
use std::path::Path;

use super::UserCommand;

fn prompt_new_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt)?;
    let password_confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != password_confirm {
        anyhow::bail!("Passwords do not match");
    }
    Ok(password)
}

pub async fn run(config_path: &Path, command: UserCommand) -> Result<()> {
    let config = Config::load(config_path)?;
    let db = Database::open(&config.database.path, config.database.pool_size)?;
    db.migrate()?;

    match command {
        UserCommand::Add {
            username,
            email,
            staff,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_new_password("Password: ")?,
            };

            auth::create_user(&db, &username, &email, &password, staff)?;
            tracing::info!(
                "User '{}' created{}",
                username,
                if staff { " (staff)" } else { "" }
            );
        }
        UserCommand::List => {
            let users = auth::list_users(&db)?;

            println!("{:<20} {:<30} {:<6}", "USERNAME", "EMAIL", "STAFF");
            println!("{}", "-".repeat(56));
            for user in users {
                println!(
                    "{:<20} {:<30} {:<6}",
                    user.username,
                    user.email,
                    if user.is_staff { "yes" } else { "no" }
                );
            }
        }
        UserCommand::Remove { username } => {
            if auth::delete_user(&db, &username)? {
                tracing::info!("User '{}' removed", username);
            } else {
                tracing::warn!("User '{}' not found", username);
            }
        }
        UserCommand::Passwd { username } => {
            let password = prompt_new_password("New password: ")?;

            if auth::update_password(&db, &username, &password)? {
                tracing::info!("Password updated for '{}'", username);
            } else {
                anyhow::bail!("User '{}' not found", username);
            }
        }
    }

    Ok(())
}
