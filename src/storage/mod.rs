pub mod credential_db;
pub mod database;
pub mod models;

pub use credential_db::CredentialDatabase;

use std::fs;
use std::path::Path;

/// Ensure data directory exists
pub fn ensure_data_dir<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}
