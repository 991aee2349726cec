use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Database engines a project may attach. Anything else is skipped by the
/// dump registry rather than treated as an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum DatabaseEngine {
    Postgres,
    Mysql,
    Mongodb,
    Redis,
}

impl DatabaseEngine {
    /// File extension of this engine's dump artifact inside an export
    /// archive: `.sql` for relational dumps, `.archive` for the document
    /// store, `.rdb` for the key-value snapshot.
    pub fn dump_extension(&self) -> &'static str {
        match self {
            DatabaseEngine::Postgres | DatabaseEngine::Mysql => "sql",
            DatabaseEngine::Mongodb => "archive",
            DatabaseEngine::Redis => "rdb",
        }
    }
}

impl Display for DatabaseEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DatabaseEngine::Postgres => write!(f, "postgres"),
            DatabaseEngine::Mysql => write!(f, "mysql"),
            DatabaseEngine::Mongodb => write!(f, "mongodb"),
            DatabaseEngine::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for DatabaseEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" | "postgresql" => Ok(DatabaseEngine::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseEngine::Mysql),
            "mongodb" | "mongo" => Ok(DatabaseEngine::Mongodb),
            "redis" => Ok(DatabaseEngine::Redis),
            _ => Err(anyhow::anyhow!("Unknown database engine: {}", s)),
        }
    }
}

/// Connection and location facts for one project database, as stored by
/// the panel. `password` may be a plaintext legacy value or an `enc:`
/// envelope; dump drivers resolve it through the encryption service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub id: Uuid,
    /// Display name, also used for the dump file name.
    pub name: String,
    pub engine: DatabaseEngine,
    /// Logical database name inside the engine.
    pub database_name: String,
    pub username: String,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for DatabaseDescriptor {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(DatabaseDescriptor {
            id: row.get("id"),
            name: row.get("name"),
            engine: row.get("engine"),
            database_name: row.get("database_name"),
            username: row.get("username"),
            password: row.get("password"),
            host: row.get("host"),
            port: row.get::<i32, _>("port") as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_round_trip() {
        for engine in [
            DatabaseEngine::Postgres,
            DatabaseEngine::Mysql,
            DatabaseEngine::Mongodb,
            DatabaseEngine::Redis,
        ] {
            assert_eq!(
                engine.to_string().parse::<DatabaseEngine>().unwrap(),
                engine
            );
        }
    }

    #[test]
    fn test_engine_aliases() {
        assert_eq!(
            "postgresql".parse::<DatabaseEngine>().unwrap(),
            DatabaseEngine::Postgres
        );
        assert_eq!(
            "mariadb".parse::<DatabaseEngine>().unwrap(),
            DatabaseEngine::Mysql
        );
        assert_eq!(
            "mongo".parse::<DatabaseEngine>().unwrap(),
            DatabaseEngine::Mongodb
        );
        assert!("sqlite".parse::<DatabaseEngine>().is_err());
    }

    #[test]
    fn test_dump_extensions() {
        assert_eq!(DatabaseEngine::Postgres.dump_extension(), "sql");
        assert_eq!(DatabaseEngine::Mysql.dump_extension(), "sql");
        assert_eq!(DatabaseEngine::Mongodb.dump_extension(), "archive");
        assert_eq!(DatabaseEngine::Redis.dump_extension(), "rdb");
    }
}
