//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::{Database, NewUser, UserRole};
use crate::jwt::{SESSION_TOKEN_DURATION_SECS, SigningAlgorithm};
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ADMIN_PASSWORD_LENGTH: usize = 8;
/// Ten years.
const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "irrigo",
    about = "Authentication backend for the irrigation inspection tracker"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "irrigo.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Algorithm used to sign session tokens
    #[arg(long, value_enum, default_value = "hs256")]
    pub jwt_algorithm: SigningAlgorithm,

    /// Session token lifetime in seconds
    #[arg(long, default_value_t = SESSION_TOKEN_DURATION_SECS, value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_SECS))]
    pub token_ttl: u64,

    /// Create an admin user with this email on startup. Password is read from ADMIN_PASSWORD
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Display name for the admin created with --create-admin
    #[arg(long, default_value = "Administrator")]
    pub admin_name: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Handle the --create-admin flag. Returns false if startup should abort.
pub async fn handle_create_admin(db: &Database, email: &str, name: &str) -> bool {
    let email = email.trim();

    match db.users().get_by_email(email).await {
        Ok(Some(existing)) => {
            info!(user = %existing.uuid, role = existing.role.as_str(), "User already exists, skipping admin creation");
            return true;
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            return false;
        }
    }

    let Ok(password) = std::env::var("ADMIN_PASSWORD") else {
        error!("ADMIN_PASSWORD environment variable is required with --create-admin");
        return false;
    };
    // SAFETY: Same as JWT_SECRET, still single-threaded startup.
    unsafe { std::env::remove_var("ADMIN_PASSWORD") };

    if password.chars().count() < MIN_ADMIN_PASSWORD_LENGTH {
        error!(
            "ADMIN_PASSWORD is shorter than {} characters",
            MIN_ADMIN_PASSWORD_LENGTH
        );
        return false;
    }

    let hashed =
        tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST)).await;
    let password_hash = match hashed {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to hash admin password");
            return false;
        }
        Err(e) => {
            error!(error = %e, "Admin password hashing task failed");
            return false;
        }
    };

    let uuid = Uuid::new_v4().to_string();
    let created = db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            email,
            name: name.trim(),
            role: UserRole::Admin,
            password_hash: &password_hash,
        })
        .await;

    match created {
        Ok(_) => {
            info!(user = %uuid, email = %email, "Admin user created");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    jwt_secret: String,
    jwt_algorithm: SigningAlgorithm,
    token_ttl_secs: u64,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        jwt_algorithm,
        token_ttl_secs,
        bcrypt_cost: bcrypt::DEFAULT_COST,
        rate_limit: RateLimitConfig::new(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
