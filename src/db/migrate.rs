use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;
use crate::error::{Result, ReportGraphError};

/// Migrations compiled into the binary, in version order.
const EMBEDDED: &[(&str, &str)] = &[(
    "001_reports_entities.sql",
    include_str!("../../migrations/001_reports_entities.sql"),
)];

/// Migration metadata
#[derive(Debug)]
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

impl Migration {
    /// Parse "001_reports_entities.sql" into version 1, name "001_reports_entities".
    fn parse(filename: &str, sql: String) -> Result<Self> {
        let version_str = filename
            .split('_')
            .next()
            .ok_or_else(|| ReportGraphError::Config(format!("Invalid migration filename: {}", filename)))?;
        let version: u32 = version_str
            .parse()
            .map_err(|_| ReportGraphError::Config(format!("Invalid migration version: {}", version_str)))?;

        Ok(Self {
            version,
            name: filename.trim_end_matches(".sql").to_string(),
            sql,
        })
    }
}

/// Create schema_migrations table if it doesn't exist
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get list of applied migrations
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
        .map_err(ReportGraphError::Database)?;
    Ok(names)
}

/// Load migration files from a directory
fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut files: Vec<_> = fs::read_dir(migrations_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    files.sort_by_key(|e| e.file_name());

    let mut migrations = Vec::with_capacity(files.len());
    for entry in files {
        let path = entry.path();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ReportGraphError::Config("Invalid migration filename".to_string()))?;
        let sql = fs::read_to_string(&path)?;
        migrations.push(Migration::parse(filename, sql)?);
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

fn embedded_migrations() -> Result<Vec<Migration>> {
    EMBEDDED
        .iter()
        .map(|(filename, sql)| Migration::parse(filename, sql.to_string()))
        .collect()
}

fn apply_migrations(conn: &mut Connection, migrations: Vec<Migration>) -> Result<()> {
    ensure_migrations_table(conn)?;
    let applied = get_applied_migrations(conn)?;

    for migration in migrations {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            ReportGraphError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("Failed to execute migration {}: {}", migration.name, e)),
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;

        log::info!("Migration {} applied successfully", migration.name);
    }

    Ok(())
}

/// Run all pending migrations found in `migrations_dir`
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    let migrations = load_migrations(migrations_dir)?;
    apply_migrations(conn, migrations)
}

/// Run all pending migrations bundled with the binary
pub fn run_embedded_migrations(conn: &mut Connection) -> Result<()> {
    apply_migrations(conn, embedded_migrations()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table_names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    #[test]
    fn test_migration_tracking() {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        ensure_migrations_table(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![1, "001_test"],
        ).unwrap();

        let applied = get_applied_migrations(&conn).unwrap();
        assert!(applied.contains(&"001_test".to_string()));
    }

    #[test]
    fn test_load_migrations_sorted_by_version() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        fs::write(migrations_dir.join("002_another.sql"), "CREATE TABLE another (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("001_test.sql"), "CREATE TABLE test (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("README.md"), "not a migration").unwrap();

        let migrations = load_migrations(&migrations_dir).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[1].name, "002_another");
    }

    #[test]
    fn test_invalid_migration_version() {
        assert!(matches!(
            Migration::parse("abc_broken.sql", String::new()),
            Err(ReportGraphError::Config(_))
        ));
    }

    #[test]
    fn test_embedded_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        run_embedded_migrations(&mut conn).unwrap();

        let tables = table_names(&conn, "table");
        assert!(tables.contains(&"reports".to_string()));
        assert!(tables.contains(&"entities".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let indexes = table_names(&conn, "index");
        assert!(indexes.contains(&"idx_entities_report_id".to_string()));
    }

    #[test]
    fn test_directory_matches_embedded() {
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        let on_disk: Vec<String> = load_migrations(&migrations_dir)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        let embedded: Vec<String> = embedded_migrations()
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(on_disk, embedded);
    }
}
