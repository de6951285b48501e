//! Ordered, one-way schema migrations.
//!
//! The SQL files under `migrations/` are embedded with `sqlx::migrate!` and
//! applied by sqlx's `Migrator`, which records them in `_sqlx_migrations`
//! so running it again is a no-op. Each file is also declared in
//! `MIGRATIONS` with the migrations it depends on; `check` refuses to run
//! when the declarations and the files disagree, or when a file would be
//! applied before something it depends on.

use std::collections::HashSet;

use sqlx::migrate::{Migrate, Migrator};
use sqlx::sqlite::SqlitePool;
use sqlx::SqliteConnection;
use tracing::warn;

pub static MIGRATOR: Migrator = sqlx::migrate!("src/db/migrations");

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub depends_on: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub id: &'static str,
    pub applied: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migrator error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Migration {0} is declared more than once")]
    Duplicate(String),
    #[error("Migration {0} depends on unknown migration {1}")]
    MissingDependency(String, String),
    #[error("Dependency cycle between migrations: {0}")]
    Cycle(String),
    #[error("Migration {0} has no declaration")]
    Undeclared(String),
    #[error("Migration {0} is declared but has no SQL file")]
    MissingFile(String),
    #[error("Migration {0} sorts before its dependency {1}")]
    OutOfOrder(String, String),
    #[error("Migration left foreign key violations behind")]
    ForeignKeyViolation,
}

/// The migrations that make up the application schema.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "0001_initial",
        depends_on: &[],
    },
    Migration {
        id: "0002_movie_preferences",
        depends_on: &["0001_initial"],
    },
    Migration {
        id: "0003_contact_messages",
        depends_on: &["0001_initial"],
    },
    Migration {
        id: "0004_recommendation_recommended_films_alter_genres",
        depends_on: &["0003_contact_messages"],
    },
];

/// Order migrations so that each one comes after everything it depends on.
/// Among migrations that are ready at the same time, declaration order wins.
pub fn plan(migrations: &[Migration]) -> Result<Vec<Migration>, MigrationError> {
    let mut ids = HashSet::new();
    for m in migrations {
        if !ids.insert(m.id) {
            return Err(MigrationError::Duplicate(m.id.to_string()));
        }
    }
    for m in migrations {
        for dep in m.depends_on {
            if !ids.contains(dep) {
                return Err(MigrationError::MissingDependency(
                    m.id.to_string(),
                    dep.to_string(),
                ));
            }
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(migrations.len());
    while ordered.len() < migrations.len() {
        let next = migrations
            .iter()
            .find(|m| !placed.contains(m.id) && m.depends_on.iter().all(|d| placed.contains(d)));
        match next {
            Some(m) => {
                placed.insert(m.id);
                ordered.push(*m);
            }
            None => {
                let stuck: Vec<&str> = migrations
                    .iter()
                    .filter(|m| !placed.contains(m.id))
                    .map(|m| m.id)
                    .collect();
                return Err(MigrationError::Cycle(stuck.join(", ")));
            }
        }
    }
    Ok(ordered)
}

/// The file stem a migration was loaded from, e.g. `0002_movie_preferences`.
pub fn file_id(m: &sqlx::migrate::Migration) -> String {
    format!("{:04}_{}", m.version, m.description.replace(' ', "_"))
}

fn version_of(migrator: &Migrator, id: &str) -> Option<i64> {
    migrator.iter().find(|m| file_id(m) == id).map(|m| m.version)
}

/// Match the declarations against the embedded files. sqlx applies files
/// by version, so every dependency must carry a lower version.
pub fn check(
    migrations: &[Migration],
    migrator: &Migrator,
) -> Result<Vec<Migration>, MigrationError> {
    let ordered = plan(migrations)?;

    for m in migrator.iter() {
        let id = file_id(m);
        if !migrations.iter().any(|d| d.id == id) {
            return Err(MigrationError::Undeclared(id));
        }
    }

    for m in &ordered {
        let version = version_of(migrator, m.id)
            .ok_or_else(|| MigrationError::MissingFile(m.id.to_string()))?;
        for dep in m.depends_on {
            let dep_version = version_of(migrator, dep)
                .ok_or_else(|| MigrationError::MissingFile(dep.to_string()))?;
            if dep_version >= version {
                return Err(MigrationError::OutOfOrder(m.id.to_string(), dep.to_string()));
            }
        }
    }

    Ok(ordered)
}

async fn applied_migrations(
    conn: &mut SqliteConnection,
) -> Result<Vec<(i64, String)>, MigrationError> {
    conn.ensure_migrations_table().await?;
    let rows = sqlx::query_as::<_, (i64, String)>(
        "SELECT version, CAST(installed_on AS TEXT) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Apply every pending migration. Returns the ids applied by this call.
pub async fn run(pool: &SqlitePool) -> Result<Vec<&'static str>, MigrationError> {
    let ordered = check(MIGRATIONS, &MIGRATOR)?;

    let mut conn = pool.acquire().await?;
    let before: HashSet<i64> = applied_migrations(&mut conn)
        .await?
        .into_iter()
        .map(|(v, _)| v)
        .collect();

    if let Err(e) = MIGRATOR.run(&mut *conn).await {
        // A file that manages its own transaction can fail halfway and
        // leave it open with foreign keys still off.
        if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            warn!("No transaction to roll back after failed migration: {}", rollback);
        }
        sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
        return Err(e.into());
    }

    let violations = sqlx::query("PRAGMA foreign_key_check")
        .fetch_all(&mut *conn)
        .await?;
    if !violations.is_empty() {
        return Err(MigrationError::ForeignKeyViolation);
    }

    let after: HashSet<i64> = applied_migrations(&mut conn)
        .await?
        .into_iter()
        .map(|(v, _)| v)
        .collect();

    Ok(ordered
        .iter()
        .filter(|m| {
            version_of(&MIGRATOR, m.id)
                .map(|v| after.contains(&v) && !before.contains(&v))
                .unwrap_or(false)
        })
        .map(|m| m.id)
        .collect())
}

/// Every known migration in apply order, with the time it was applied.
pub async fn status(pool: &SqlitePool) -> Result<Vec<MigrationStatus>, MigrationError> {
    let ordered = check(MIGRATIONS, &MIGRATOR)?;
    let mut conn = pool.acquire().await?;
    let applied = applied_migrations(&mut conn).await?;

    Ok(ordered
        .iter()
        .map(|m| MigrationStatus {
            id: m.id,
            applied: version_of(&MIGRATOR, m.id).and_then(|v| {
                applied
                    .iter()
                    .find(|(version, _)| *version == v)
                    .map(|(_, at)| at.clone())
            }),
        })
        .collect())
}
