//! Backup-before-migrate pipeline for the application database.
//!
//! An existing database is dumped and gzip-compressed into the backup
//! directory before any schema change runs. If that snapshot cannot be made
//! the migration is never attempted. A failed apply is not rolled back; the
//! snapshot is the operator's recovery path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDateTime;
use flate2::Compression;
use flate2::write::GzEncoder;

use super::error::{BackupStage, ProvisionError};
use super::exec::{self, CommandError};

const FLASK_APP: &str = "indi_allsky.flask";

/// Database engine and migration tool, as external collaborators
pub trait DatabaseTooling {
    /// Full logical dump of the database at `path`
    fn dump(&self, path: &Path) -> Result<Vec<u8>, CommandError>;

    /// Compress `path` in place, returning the compressed file
    fn compress(&self, path: &Path) -> std::io::Result<PathBuf> {
        gzip_in_place(path)
    }

    fn generate_migration(&self) -> Result<(), CommandError>;
    fn apply_migration(&self) -> Result<(), CommandError>;
}

/// `sqlite3` for dumps, Flask-Migrate for schema changes
#[derive(Debug, Clone)]
pub struct SqliteFlaskMigrate {
    pub app_directory: PathBuf,
    pub virtualenv: PathBuf,
}

impl SqliteFlaskMigrate {
    fn flask(&self) -> Command {
        let mut cmd = Command::new(self.virtualenv.join("bin/flask"));
        cmd.current_dir(&self.app_directory).env("FLASK_APP", FLASK_APP);
        cmd
    }
}

impl DatabaseTooling for SqliteFlaskMigrate {
    fn dump(&self, path: &Path) -> Result<Vec<u8>, CommandError> {
        let output = exec::run(Command::new("sqlite3").arg(path).arg(".dump"))?;
        Ok(output.stdout)
    }

    fn generate_migration(&self) -> Result<(), CommandError> {
        exec::run(self.flask().args(["db", "revision", "--autogenerate"]))?;
        Ok(())
    }

    fn apply_migration(&self) -> Result<(), CommandError> {
        exec::run(self.flask().args(["db", "upgrade", "head"]))?;
        Ok(())
    }
}

/// Timestamped compressed snapshot taken before migrating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub source_database: PathBuf,
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub compressed: bool,
}

/// Snapshot `db_path` (when it exists) into `backup_dir`, then migrate.
pub fn backup_and_migrate(
    tool: &dyn DatabaseTooling,
    db_path: &Path,
    backup_dir: &Path,
    timestamp: NaiveDateTime,
) -> Result<Option<BackupArtifact>, ProvisionError> {
    let artifact = if db_path.exists() {
        Some(backup(tool, db_path, backup_dir, timestamp)?)
    } else {
        log::info!("No database at {}, skipping backup", db_path.display());
        None
    };

    log::info!("Generating database migration");
    tool.generate_migration()
        .map_err(ProvisionError::MigrationGenerateFailed)?;

    log::info!("Applying database migration");
    tool.apply_migration()
        .map_err(ProvisionError::MigrationApplyFailed)?;

    Ok(artifact)
}

fn backup(
    tool: &dyn DatabaseTooling,
    db_path: &Path,
    backup_dir: &Path,
    timestamp: NaiveDateTime,
) -> Result<BackupArtifact, ProvisionError> {
    let failed = |stage, reason: String| ProvisionError::BackupFailed {
        database: db_path.to_path_buf(),
        stage,
        reason,
    };

    let dump_path = backup_path(backup_dir, timestamp);
    log::info!("Backing up {} to {}", db_path.display(), dump_path.display());

    let dump = tool
        .dump(db_path)
        .map_err(|e| failed(BackupStage::Dump, e.to_string()))?;
    write_new(&dump_path, &dump).map_err(|e| failed(BackupStage::Dump, e.to_string()))?;

    let compressed = tool
        .compress(&dump_path)
        .map_err(|e| failed(BackupStage::Compress, e.to_string()))?;

    Ok(BackupArtifact {
        source_database: db_path.to_path_buf(),
        path: compressed,
        timestamp,
        compressed: true,
    })
}

/// `backup_<YYYYmmdd_HHMMSS>.sql`, suffixed `_N` if that name (or its
/// compressed form) is taken.
pub fn backup_path(backup_dir: &Path, timestamp: NaiveDateTime) -> PathBuf {
    let stem = format!("backup_{}", timestamp.format("%Y%m%d_%H%M%S"));
    let taken = |p: &Path| p.exists() || gz_path(p).exists();

    let first = backup_dir.join(format!("{stem}.sql"));
    if !taken(&first) {
        return first;
    }
    (1u32..)
        .map(|n| backup_dir.join(format!("{stem}_{n}.sql")))
        .find(|p| !taken(p))
        .unwrap_or(first)
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

/// gzip `path` to `path.gz` and remove the original
pub fn gzip_in_place(path: &Path) -> std::io::Result<PathBuf> {
    let target = gz_path(path);
    let mut input = fs::File::open(path)?;

    let output = fs::OpenOptions::new().write(true).create_new(true).open(&target)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()?;

    fs::remove_file(path)?;
    Ok(target)
}
