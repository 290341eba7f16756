use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use super::auth_service::hash_password;
use crate::config::Config;
use crate::models::user::{Profile, User, UserType};
use crate::store::{DocumentStore, StoreError};

#[derive(Debug, Deserialize)]
pub struct SuperuserSeed {
    pub email: String,
    #[serde(default = "default_superuser_username")]
    pub username: String,
    /// Plain-text password from seed file (hashed before storage)
    pub password: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

fn default_superuser_username() -> String {
    "superadmin".to_string()
}

/// Demo accounts: (username, email, password, userType)
const DEMO_USERS: [(&str, &str, &str, UserType); 3] = [
    ("demo_dummy", "dummy@coursehub.local", "dummy123", UserType::Dummy),
    ("demo_test", "test@coursehub.local", "test1234", UserType::Test),
    ("demo_admin", "admin@coursehub.local", "admin123", UserType::Admin),
];

/// Creates the configured superuser and demo accounts. Existing accounts
/// (matched by email or username) are left untouched.
pub async fn bootstrap(config: &Config, store: &dyn DocumentStore) -> Result<()> {
    if let Some(path) = config.superuser_seed_file.as_deref().filter(|p| !p.is_empty()) {
        seed_superuser(Path::new(path), config.bcrypt_cost, store).await?;
    } else {
        tracing::debug!("No superuser seed file configured, skipping bootstrap");
    }

    if config.seed_demo_users {
        for (username, email, password, user_type) in DEMO_USERS {
            let user = User::new(
                username.to_string(),
                email.to_string(),
                hash_password(password, config.bcrypt_cost)?,
                user_type,
            );
            if insert_if_absent(store, user).await? {
                tracing::info!(email, user_type = user_type.as_str(), "Demo user created");
            }
        }
    }

    Ok(())
}

async fn seed_superuser(path: &Path, bcrypt_cost: u32, store: &dyn DocumentStore) -> Result<()> {
    if !path.exists() {
        tracing::warn!(
            "Superuser seed file {} not found, skipping bootstrap",
            path.display()
        );
        return Ok(());
    }

    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read superuser seed file")?;
    let seed: SuperuserSeed =
        serde_json::from_str(&contents).context("Failed to deserialize superuser seed payload")?;

    let mut user = User::new(
        seed.username,
        seed.email,
        hash_password(&seed.password, bcrypt_cost)?,
        UserType::Admin,
    );
    user.is_verified = true;
    if let Some(profile) = seed.profile {
        user.profile.merge(profile);
    }

    let email = user.email.clone();
    if insert_if_absent(store, user).await? {
        tracing::info!(email = %email, "Superuser inserted; remove seed file to prevent rerun");
    } else {
        tracing::info!(email = %email, "Superuser already exists, seed skipped");
    }
    Ok(())
}

async fn insert_if_absent(store: &dyn DocumentStore, user: User) -> Result<bool> {
    if store
        .find_user_by_email_or_username(&user.email, &user.username)
        .await?
        .is_some()
    {
        return Ok(false);
    }
    match store.insert_user(&user).await {
        Ok(()) => Ok(true),
        // Another instance seeded it first.
        Err(StoreError::Duplicate(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
