//! Flask-AppBuilder tables in Superset's SQLite metadata database.
//!
//! Reads and writes `ab_user`, `ab_role` and `ab_user_role`. Extra user
//! attributes live in `ab_user_extra`, a table the bridge owns.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};

use super::{BUILTIN_ROLES, NewUser, Role, StoreError, StoreResult, SupersetUser, UserStore};
use crate::config::SqliteConfig;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ab_role (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name VARCHAR(64) NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ab_user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name VARCHAR(64) NOT NULL,
        last_name VARCHAR(64) NOT NULL,
        username VARCHAR(64) NOT NULL UNIQUE,
        password VARCHAR(256),
        active BOOLEAN,
        email VARCHAR(320) NOT NULL UNIQUE,
        last_login DATETIME,
        login_count INTEGER,
        fail_login_count INTEGER,
        created_on DATETIME,
        changed_on DATETIME,
        created_by_fk INTEGER REFERENCES ab_user(id),
        changed_by_fk INTEGER REFERENCES ab_user(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ab_user_role (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER REFERENCES ab_user(id),
        role_id INTEGER REFERENCES ab_role(id),
        UNIQUE (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ab_user_extra (
        user_id INTEGER PRIMARY KEY REFERENCES ab_user(id) ON DELETE CASCADE,
        extra TEXT NOT NULL DEFAULT '{}'
    )
    "#,
];

const USER_COLUMNS: &str = r#"
    SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password,
           u.active, u.login_count, e.extra
    FROM ab_user u
    LEFT JOIN ab_user_extra e ON e.user_id = u.id
"#;

pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using the `[database]` settings, bootstrapping the schema and
    /// seeding roles when configured to.
    pub async fn connect(cfg: &SqliteConfig) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&cfg.path)
                    .create_if_missing(cfg.create_if_missing)
                    .foreign_keys(true)
                    .journal_mode(if cfg.wal_mode {
                        SqliteJournalMode::Wal
                    } else {
                        SqliteJournalMode::Delete
                    })
                    .busy_timeout(Duration::from_millis(cfg.busy_timeout_ms)),
            )
            .await?;

        let store = Self::new(pool);
        if cfg.bootstrap_schema {
            store.bootstrap_schema().await?;
        }
        if cfg.seed_roles {
            store.seed_roles(BUILTIN_ROLES).await?;
        }
        Ok(store)
    }

    /// Create any missing tables. Safe to run against an existing Superset
    /// database.
    pub async fn bootstrap_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn seed_roles<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> StoreResult<()> {
        for name in names {
            sqlx::query("INSERT OR IGNORE INTO ab_role (name) VALUES (?)")
                .bind(name)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn fetch_user(&self, filter: &str, value: &str) -> StoreResult<Option<SupersetUser>> {
        let query = format!("{USER_COLUMNS} WHERE {filter}");
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut user = user_from_row(&row)?;
        user.roles = self.roles_for(user.id).await?;
        Ok(Some(user))
    }

    async fn roles_for(&self, user_id: i64) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name
            FROM ab_role r
            INNER JOIN ab_user_role ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Role {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

fn user_from_row(row: &SqliteRow) -> StoreResult<SupersetUser> {
    let extra = match row.get::<Option<String>, _>("extra") {
        Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw)?,
        None => Map::new(),
    };

    Ok(SupersetUser {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password: row.get::<Option<String>, _>("password").unwrap_or_default(),
        active: row.get::<Option<bool>, _>("active").unwrap_or(false),
        roles: Vec::new(),
        extra,
        login_count: row.get::<Option<i64>, _>("login_count").unwrap_or(0),
    })
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_user(&self, email: &str) -> StoreResult<Option<SupersetUser>> {
        self.fetch_user("lower(u.email) = lower(?)", email).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<SupersetUser>> {
        self.fetch_user("u.username = ?", username).await
    }

    async fn find_role(&self, name: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query("SELECT id, name FROM ab_role WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Role {
            id: row.get("id"),
            name: row.get("name"),
        }))
    }

    async fn add_user(&self, user: NewUser) -> StoreResult<SupersetUser> {
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO ab_user (
                first_name, last_name, username, password, active, email,
                login_count, fail_login_count, created_on, changed_on
            )
            VALUES (?, ?, ?, ?, 1, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.username)
        .bind(&user.password)
        .bind(&user.email)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(format!("User with email '{}' already exists", user.email))
            }
            _ => StoreError::from(e),
        })?;

        let id = result.last_insert_rowid();
        for role in &user.roles {
            sqlx::query("INSERT INTO ab_user_role (user_id, role_id) VALUES (?, ?)")
                .bind(id)
                .bind(role.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(SupersetUser {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password: user.password,
            active: true,
            roles: user.roles,
            extra: Map::new(),
            login_count: 0,
        })
    }

    async fn update_user(&self, user: &SupersetUser) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE ab_user
            SET first_name = ?, last_name = ?, username = ?, email = ?,
                password = ?, active = ?, changed_on = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.active)
        .bind(chrono::Utc::now())
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query("DELETE FROM ab_user_role WHERE user_id = ?")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        for role in &user.roles {
            sqlx::query("INSERT INTO ab_user_role (user_id, role_id) VALUES (?, ?)")
                .bind(user.id)
                .bind(role.id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO ab_user_extra (user_id, extra) VALUES (?, ?)
            ON CONFLICT (user_id) DO UPDATE SET extra = excluded.extra
            "#,
        )
        .bind(user.id)
        .bind(serde_json::to_string(&user.extra)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_login(&self, user_id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE ab_user
            SET last_login = ?, login_count = COALESCE(login_count, 0) + 1,
                fail_login_count = 0
            WHERE id = ?
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
