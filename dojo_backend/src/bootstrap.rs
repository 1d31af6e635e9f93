use crate::config::DojoConfig;
use crate::database::Database;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub struct BootstrapResources {
    pub directories_created: Vec<String>,
    pub database_initialized: bool,
    pub database: Database,
}

/// Prepares the on-disk layout and opens the migrated database.
pub fn initialize(config: &DojoConfig) -> Result<BootstrapResources> {
    let mut directories_created = Vec::new();
    create_dir_if_missing(&config.paths.data_dir, &mut directories_created)?;
    create_dir_if_missing(&config.paths.blobs_dir, &mut directories_created)?;

    let database = Database::connect(&config.paths)
        .with_context(|| format!("failed to open {}", config.paths.db_path.display()))?;
    let database_initialized = database.ensure_migrations()?;

    Ok(BootstrapResources {
        directories_created,
        database_initialized,
        database,
    })
}

fn create_dir_if_missing(path: &Path, created: &mut Vec<String>) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        created.push(path.display().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DojoPaths;
    use tempfile::tempdir;

    #[test]
    fn initialize_creates_layout_once() {
        let temp = tempdir().expect("tempdir");
        let config = DojoConfig::new(0, DojoPaths::from_base_dir(temp.path()).expect("paths"));

        let first = initialize(&config).expect("bootstrap");
        assert_eq!(first.directories_created.len(), 2);
        assert!(first.database_initialized);
        assert!(config.paths.db_path.exists());
        drop(first);

        let second = initialize(&config).expect("bootstrap again");
        assert!(second.directories_created.is_empty());
        assert!(!second.database_initialized);
    }
}
