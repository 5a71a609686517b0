//! Integration tests for `SessionRepo` against a real Postgres.
//!
//! These need `DATABASE_URL` pointing at a server sqlx can create scratch
//! databases on, so they are ignored by default:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test -p keyward-db -- --ignored
//! ```

use chrono::{Duration, Utc};
use keyward_core::hashing::hash_token;
use keyward_core::types::{Timestamp, UserId};
use keyward_db::models::session::{NewSession, SessionRotation};
use keyward_db::repositories::SessionRepo;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_session(user_id: UserId, token: &str, created_at: Timestamp, ttl: Duration) -> NewSession {
    NewSession {
        id: Uuid::new_v4(),
        user_id,
        access_token_hash: hash_token(&format!("access-{token}")),
        refresh_token_hash: hash_token(&format!("refresh-{token}")),
        device_info: [("browser".to_string(), "Firefox".to_string())].into(),
        ip_address: Some("192.0.2.10".into()),
        user_agent: Some("Mozilla/5.0 Firefox/121.0".into()),
        created_at,
        expires_at: created_at + ttl,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn create_and_touch_round_trip(pool: PgPool) {
    let now = Utc::now();
    let input = new_session(Uuid::new_v4(), "one", now, Duration::hours(1));
    let created = SessionRepo::create(&pool, &input).await.unwrap();
    assert_eq!(created.device_info["browser"], "Firefox");
    assert!(!created.is_revoked);

    let later = now + Duration::minutes(10);
    let touched = SessionRepo::touch_active_by_access_hash(&pool, &input.access_token_hash, later)
        .await
        .unwrap()
        .expect("active session should be found");
    assert_eq!(touched.id, created.id);
    assert_eq!(touched.last_used_at.timestamp(), later.timestamp());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn rotation_is_single_use(pool: PgPool) {
    let now = Utc::now();
    let input = new_session(Uuid::new_v4(), "two", now, Duration::hours(1));
    SessionRepo::create(&pool, &input).await.unwrap();

    let rotation = SessionRotation {
        access_token_hash: hash_token("access-two-b"),
        refresh_token_hash: hash_token("refresh-two-b"),
        expires_at: now + Duration::hours(2),
    };

    let first = SessionRepo::rotate_by_refresh_hash(&pool, &input.refresh_token_hash, &rotation, now)
        .await
        .unwrap();
    assert!(first.is_some());

    let second =
        SessionRepo::rotate_by_refresh_hash(&pool, &input.refresh_token_hash, &rotation, now)
            .await
            .unwrap();
    assert!(second.is_none(), "old refresh token must not rotate twice");
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn revoke_is_idempotent(pool: PgPool) {
    let now = Utc::now();
    let input = new_session(Uuid::new_v4(), "three", now, Duration::hours(1));
    let created = SessionRepo::create(&pool, &input).await.unwrap();

    assert!(SessionRepo::revoke(&pool, created.id, "manual_logout", now)
        .await
        .unwrap());
    assert!(!SessionRepo::revoke(&pool, created.id, "again", now + Duration::seconds(5))
        .await
        .unwrap());

    let row = SessionRepo::find_by_id(&pool, created.id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.is_revoked);
    assert_eq!(row.revoked_reason.as_deref(), Some("manual_logout"));
    assert_eq!(row.revoked_at.unwrap().timestamp(), now.timestamp());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn cleanup_keeps_rows_inside_grace_window(pool: PgPool) {
    let now = Utc::now();
    let user = Uuid::new_v4();
    // Expired 10 days ago and 2 days ago respectively.
    let old = new_session(user, "old", now - Duration::days(11), Duration::days(1));
    let recent = new_session(user, "recent", now - Duration::days(3), Duration::days(1));
    SessionRepo::create(&pool, &old).await.unwrap();
    SessionRepo::create(&pool, &recent).await.unwrap();

    let deleted = SessionRepo::delete_expired_before(&pool, now - Duration::days(7))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(SessionRepo::find_by_id(&pool, recent.id)
        .await
        .unwrap()
        .is_some());
}
