//! Local identity provider
//!
//! Users are keyed by email. The first sign-in with an address mints a
//! stable user id; later sign-ins with the same address get the same id.
//! The active session is kept in SQLite so separate processes agree on who
//! is signed in.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{AuthChannel, AuthError, AuthSubscription, Credentials, Identity, IdentityProvider, UserId};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    email TEXT UNIQUE NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- At most one signed-in user per data directory
CREATE TABLE IF NOT EXISTS active_session (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    user_id TEXT NOT NULL REFERENCES users(user_id),
    signed_in_at TEXT NOT NULL
);
"#;

pub struct LocalIdentityProvider {
    conn: Mutex<Connection>,
    channel: AuthChannel,
}

impl LocalIdentityProvider {
    /// Open the identity tables at `db_path`, restoring any active session
    pub fn open(db_path: &Path) -> Result<Self, AuthError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AuthError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AuthError> {
        conn.execute_batch(SCHEMA)?;
        let active = load_active(&conn)?;
        if let Some(identity) = &active {
            debug!("Restored session for {}", identity.display);
        }

        Ok(Self {
            conn: Mutex::new(conn),
            channel: AuthChannel::new(active),
        })
    }

    /// Live subscriptions to identity changes
    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuthError> {
        self.conn.lock().map_err(|_| AuthError::Poisoned)
    }
}

fn load_active(conn: &Connection) -> Result<Option<Identity>, AuthError> {
    let identity = conn
        .query_row(
            r#"
            SELECT u.user_id, u.email
            FROM active_session s JOIN users u ON u.user_id = s.user_id
            WHERE s.slot = 0
            "#,
            [],
            |row| {
                Ok(Identity {
                    user_id: UserId::new(row.get::<_, String>(0)?),
                    display: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(identity)
}

/// Trim and lowercase an email, rejecting anything without `local@domain`
fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(AuthError::InvalidCredentials(format!(
            "'{}' is not an email address",
            raw.trim()
        ))),
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let email = normalize_email(&credentials.email)?;

        let identity = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM users WHERE email = ?1",
                    params![email],
                    |row| row.get(0),
                )
                .optional()?;

            let user_id = match existing {
                Some(id) => id,
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO users (user_id, email) VALUES (?1, ?2)",
                        params![id, email],
                    )?;
                    info!("Registered new user {}", email);
                    id
                }
            };

            tx.execute(
                r#"
                INSERT INTO active_session (slot, user_id, signed_in_at) VALUES (0, ?1, ?2)
                ON CONFLICT(slot) DO UPDATE SET
                    user_id = excluded.user_id,
                    signed_in_at = excluded.signed_in_at
                "#,
                params![user_id, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;

            Identity {
                user_id: UserId::new(user_id),
                display: email,
            }
        };

        info!("Signed in as {}", identity.display);
        self.channel.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.conn()?.execute("DELETE FROM active_session", [])?;
        info!("Signed out");
        self.channel.publish(None);
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        self.channel.current()
    }

    fn subscribe(&self) -> AuthSubscription {
        self.channel.subscribe()
    }
}
