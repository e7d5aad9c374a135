//! Admission gate for the chat WebSocket.
//!
//! The forum's login flow issues a session cookie; this module turns it into
//! an authenticated user before any agent is created.

use agora_shared::UserId;
use agora_store::SharedDatabase;
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::debug;

use crate::error::ServerError;

/// The user behind a live forum session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: UserId,
    pub username: String,
}

/// Resolve the session cookie named `cookie_name` to its user.
///
/// A missing, unknown or expired session and a session whose user no longer
/// exists are all `Unauthorized`; store failures are passed through.
pub async fn authenticate(
    jar: &CookieJar,
    cookie_name: &str,
    db: &SharedDatabase,
) -> Result<SessionUser, ServerError> {
    let session_id = jar
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ServerError::Unauthorized("missing session cookie".into()))?;

    let now = Utc::now();
    let user_id = db
        .call(move |db| db.get_session_user(&session_id, now))
        .await?
        .ok_or_else(|| ServerError::Unauthorized("session unknown or expired".into()))?;

    let username = db
        .call(move |db| db.get_username(user_id))
        .await?
        .ok_or_else(|| ServerError::Unauthorized(format!("no user with id {user_id}")))?;

    debug!(user_id = %user_id, "Session authenticated");
    Ok(SessionUser { user_id, username })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_store::Database;
    use axum_extra::extract::cookie::Cookie;
    use chrono::Duration;

    async fn db_with_session(expires_in: Duration) -> SharedDatabase {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        db.call(move |db| {
            let alice = db.insert_user("alice")?;
            db.insert_session("s1", alice, Utc::now() + expires_in)
        })
        .await
        .unwrap();
        db
    }

    fn jar(value: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new("session_id", value.to_string()))
    }

    #[tokio::test]
    async fn live_session_is_admitted() {
        let db = db_with_session(Duration::hours(1)).await;
        let user = authenticate(&jar("s1"), "session_id", &db).await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn missing_or_expired_sessions_are_unauthorized() {
        let db = db_with_session(Duration::hours(-1)).await;

        let err = authenticate(&CookieJar::new(), "session_id", &db).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));

        let err = authenticate(&jar("s1"), "session_id", &db).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));

        let err = authenticate(&jar("other"), "session_id", &db).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn cookie_name_is_configurable() {
        let db = db_with_session(Duration::hours(1)).await;
        assert!(authenticate(&jar("s1"), "forum_sid", &db).await.is_err());
    }
}
