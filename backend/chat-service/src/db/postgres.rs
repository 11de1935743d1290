use super::{
    bounded, ChatRepository, MemberRepository, ProfileRepository, VerificationCodeRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, Mailbox, MailboxEntry, Member, Profile, VerificationCode};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use std::time::Duration;
use ulid::Ulid;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn init_pool(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

/// PostgreSQL implementation of every persistence role.
pub struct PgStore {
    pool: PgPool,
    call_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, call_timeout: Duration) -> Self {
        Self { pool, call_timeout }
    }
}

fn conflict_or(err: sqlx::Error, conflict: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::Conflict(conflict.to_string());
        }
    }
    AppError::from(err)
}

#[async_trait]
impl ChatRepository for PgStore {
    async fn append(&self, message: &ChatMessage) -> AppResult<()> {
        bounded(self.call_timeout, async {
            sqlx::query(
                r#"
                INSERT INTO chat_messages (id, chat_id, sender, receiver, message, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&message.id)
            .bind(&message.chat_id)
            .bind(&message.sender)
            .bind(&message.receiver)
            .bind(&message.message)
            .bind(message.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_read(&self, owner: &str, counterpart: &str) -> AppResult<u64> {
        bounded(self.call_timeout, async {
            let result = sqlx::query(
                r#"
                UPDATE mailboxes SET is_read = TRUE
                WHERE sender = $1 AND $2 = ANY(receiver) AND NOT is_read
                "#,
            )
            .bind(owner)
            .bind(counterpart)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn upsert_mailbox(
        &self,
        owner: &str,
        recipients: &[String],
        last_message: &str,
        is_read: bool,
    ) -> AppResult<()> {
        let mut recipients = recipients.to_vec();
        recipients.sort();

        bounded(self.call_timeout, async {
            sqlx::query(
                r#"
                INSERT INTO mailboxes (id, sender, receiver, message, is_read, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (sender, receiver) DO UPDATE
                SET message = EXCLUDED.message,
                    is_read = EXCLUDED.is_read,
                    created_at = EXCLUDED.created_at
                "#,
            )
            .bind(Ulid::new().to_string())
            .bind(owner)
            .bind(&recipients)
            .bind(last_message)
            .bind(is_read)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn history(&self, chat_id: &str) -> AppResult<Vec<ChatMessage>> {
        bounded(self.call_timeout, async {
            let rows = sqlx::query_as::<_, ChatMessage>(
                r#"
                SELECT id, chat_id, sender, receiver, message, created_at
                FROM chat_messages
                WHERE chat_id = $1
                ORDER BY seq ASC
                "#,
            )
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list(&self, owner: &str) -> AppResult<Vec<MailboxEntry>> {
        bounded(self.call_timeout, async {
            let rows = sqlx::query_as::<_, Mailbox>(
                r#"
                SELECT id, sender, receiver, message, is_read, created_at
                FROM mailboxes
                WHERE sender = $1
                ORDER BY created_at DESC
                "#,
            )
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;

            let mut ids: Vec<String> = rows.iter().flat_map(|r| r.receiver.clone()).collect();
            ids.sort();
            ids.dedup();

            let profiles = if ids.is_empty() {
                Vec::new()
            } else {
                sqlx::query_as::<_, Profile>(
                    r#"
                    SELECT id, member, display_name, nick_name, profile_image,
                           authorized, is_private, created_at
                    FROM profiles
                    WHERE id = ANY($1)
                    "#,
                )
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?
            };

            Ok(rows
                .into_iter()
                .map(|row| MailboxEntry::resolve(row, &profiles))
                .collect())
        })
        .await
    }

    async fn unread_count(&self, owner: &str) -> AppResult<i64> {
        bounded(self.call_timeout, async {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM mailboxes WHERE sender = $1 AND NOT is_read",
            )
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        })
        .await
    }
}

#[async_trait]
impl MemberRepository for PgStore {
    async fn create(&self, member: &Member) -> AppResult<()> {
        bounded(self.call_timeout, async {
            sqlx::query(
                r#"
                INSERT INTO members (id, email, password_hash, verified, active, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&member.id)
            .bind(&member.email)
            .bind(&member.password_hash)
            .bind(member.verified)
            .bind(member.active)
            .bind(member.created_at)
            .bind(member.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "email_taken"))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        bounded(self.call_timeout, async {
            sqlx::query("DELETE FROM members WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn find(&self, id: &str) -> AppResult<Option<Member>> {
        bounded(self.call_timeout, async {
            let member = sqlx::query_as::<_, Member>(
                r#"
                SELECT id, email, password_hash, verified, active, created_at, updated_at
                FROM members WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(member)
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        bounded(self.call_timeout, async {
            let member = sqlx::query_as::<_, Member>(
                r#"
                SELECT id, email, password_hash, verified, active, created_at, updated_at
                FROM members WHERE LOWER(email) = LOWER($1)
                "#,
            )
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
            Ok(member)
        })
        .await
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> AppResult<()> {
        bounded(self.call_timeout, async {
            let result = sqlx::query(
                "UPDATE members SET password_hash = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("member".into()));
            }
            Ok(())
        })
        .await
    }

    async fn mark_verified(&self, id: &str) -> AppResult<()> {
        bounded(self.call_timeout, async {
            let result = sqlx::query(
                "UPDATE members SET verified = TRUE, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("member".into()));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ProfileRepository for PgStore {
    async fn create(&self, profile: &Profile) -> AppResult<()> {
        bounded(self.call_timeout, async {
            sqlx::query(
                r#"
                INSERT INTO profiles (id, member, display_name, nick_name, profile_image,
                                      authorized, is_private, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&profile.id)
            .bind(&profile.member)
            .bind(&profile.display_name)
            .bind(&profile.nick_name)
            .bind(&profile.profile_image)
            .bind(profile.authorized)
            .bind(profile.is_private)
            .bind(profile.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "nickname_taken"))?;
            Ok(())
        })
        .await
    }

    async fn find_by_member(&self, member_id: &str) -> AppResult<Option<Profile>> {
        bounded(self.call_timeout, async {
            let profile = sqlx::query_as::<_, Profile>(
                r#"
                SELECT id, member, display_name, nick_name, profile_image,
                       authorized, is_private, created_at
                FROM profiles WHERE member = $1
                "#,
            )
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(profile)
        })
        .await
    }

    async fn find_by_nick_name(&self, nick_name: &str) -> AppResult<Option<Profile>> {
        bounded(self.call_timeout, async {
            let profile = sqlx::query_as::<_, Profile>(
                r#"
                SELECT id, member, display_name, nick_name, profile_image,
                       authorized, is_private, created_at
                FROM profiles WHERE nick_name = LOWER($1)
                "#,
            )
            .bind(nick_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(profile)
        })
        .await
    }
}

#[async_trait]
impl VerificationCodeRepository for PgStore {
    async fn replace_for_member(&self, code: &VerificationCode) -> AppResult<()> {
        bounded(self.call_timeout, async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM verification_codes WHERE member = $1")
                .bind(&code.member)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO verification_codes (id, member, email, code, code_type, taken,
                                                expired_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&code.id)
            .bind(&code.member)
            .bind(&code.email)
            .bind(&code.code)
            .bind(code.code_type)
            .bind(code.taken)
            .bind(code.expired_at)
            .bind(code.created_at)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn find_untaken(
        &self,
        member_id: &str,
        code: &str,
        code_type: i16,
    ) -> AppResult<Option<VerificationCode>> {
        bounded(self.call_timeout, async {
            let found = sqlx::query_as::<_, VerificationCode>(
                r#"
                SELECT id, member, email, code, code_type, taken, expired_at, created_at
                FROM verification_codes
                WHERE member = $1 AND code = $2 AND code_type = $3 AND NOT taken
                "#,
            )
            .bind(member_id)
            .bind(code)
            .bind(code_type)
            .fetch_optional(&self.pool)
            .await?;
            Ok(found)
        })
        .await
    }

    async fn mark_taken(&self, id: &str) -> AppResult<()> {
        bounded(self.call_timeout, async {
            sqlx::query("UPDATE verification_codes SET taken = TRUE WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;

    /// Pool against `DATABASE_TEST_URL`, or `None` to skip.
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("DATABASE_TEST_URL").ok()?;
        match tokio::time::timeout(Duration::from_secs(2), init_pool(&url)).await {
            Ok(Ok(pool)) => Some(pool),
            _ => {
                eprintln!("postgres unavailable, skipping");
                None
            }
        }
    }

    #[tokio::test]
    async fn test_history_keeps_insertion_order() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = PgStore::new(pool, Duration::from_secs(5));
        let chat_id = format!("{}-{}", Ulid::new(), Ulid::new());

        for text in ["one", "two", "three"] {
            let msg = ChatMessage::stamped(chat_id.clone(), "a", "b", text);
            store.append(&msg).await.unwrap();
        }

        let history = store.history(&chat_id).await.unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_mailbox_upsert_and_unread() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = PgStore::new(pool, Duration::from_secs(5));
        let owner = Ulid::new().to_string();
        let other = vec![Ulid::new().to_string()];

        store.upsert_mailbox(&owner, &other, "hi", false).await.unwrap();
        store.upsert_mailbox(&owner, &other, "hi again", false).await.unwrap();
        assert_eq!(store.unread_count(&owner).await.unwrap(), 1);

        assert_eq!(store.mark_read(&owner, &other[0]).await.unwrap(), 1);
        assert_eq!(store.unread_count(&owner).await.unwrap(), 0);

        let list = store.list(&owner).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message, "hi again");
    }
}
