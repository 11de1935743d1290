use super::{ChatRepository, MemberRepository, ProfileRepository, VerificationCodeRepository};
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, Mailbox, MailboxEntry, Member, Profile, VerificationCode};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

#[derive(Default)]
struct Tables {
    messages: Vec<ChatMessage>,
    mailboxes: Vec<Mailbox>,
    members: HashMap<String, Member>,
    profiles: HashMap<String, Profile>,
    codes: Vec<VerificationCode>,
}

/// Process-local store for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn recipient_set(recipients: &[String]) -> Vec<String> {
    let mut set = recipients.to_vec();
    set.sort();
    set
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn append(&self, message: &ChatMessage) -> AppResult<()> {
        self.tables.write().await.messages.push(message.clone());
        Ok(())
    }

    async fn mark_read(&self, owner: &str, counterpart: &str) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for row in tables.mailboxes.iter_mut() {
            if row.sender == owner && !row.is_read && row.receiver.iter().any(|r| r == counterpart)
            {
                row.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn upsert_mailbox(
        &self,
        owner: &str,
        recipients: &[String],
        last_message: &str,
        is_read: bool,
    ) -> AppResult<()> {
        let recipients = recipient_set(recipients);
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        match tables
            .mailboxes
            .iter_mut()
            .find(|row| row.sender == owner && row.receiver == recipients)
        {
            Some(row) => {
                row.message = last_message.to_string();
                row.is_read = is_read;
                row.created_at = now;
            }
            None => tables.mailboxes.push(Mailbox {
                id: Ulid::new().to_string(),
                sender: owner.to_string(),
                receiver: recipients,
                message: last_message.to_string(),
                is_read,
                created_at: now,
            }),
        }
        Ok(())
    }

    async fn history(&self, chat_id: &str) -> AppResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn list(&self, owner: &str) -> AppResult<Vec<MailboxEntry>> {
        let tables = self.tables.read().await;
        let profiles: Vec<Profile> = tables.profiles.values().cloned().collect();

        let mut rows: Vec<Mailbox> = tables
            .mailboxes
            .iter()
            .filter(|row| row.sender == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rows
            .into_iter()
            .map(|row| MailboxEntry::resolve(row, &profiles))
            .collect())
    }

    async fn unread_count(&self, owner: &str) -> AppResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .mailboxes
            .iter()
            .filter(|row| row.sender == owner && !row.is_read)
            .count() as i64)
    }
}

#[async_trait]
impl MemberRepository for MemoryStore {
    async fn create(&self, member: &Member) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .members
            .values()
            .any(|m| m.email.eq_ignore_ascii_case(&member.email))
        {
            return Err(AppError::Conflict("email_taken".into()));
        }
        tables.members.insert(member.id.clone(), member.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.members.remove(id);
        tables.profiles.retain(|_, p| p.member != id);
        tables.codes.retain(|c| c.member != id);
        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<Member>> {
        Ok(self.tables.read().await.members.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        let email = email.trim();
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .values()
            .find(|m| m.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let member = tables
            .members
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound("member".into()))?;
        member.password_hash = password_hash.to_string();
        member.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_verified(&self, id: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let member = tables
            .members
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound("member".into()))?;
        member.verified = true;
        member.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn create(&self, profile: &Profile) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .profiles
            .values()
            .any(|p| p.nick_name == profile.nick_name)
        {
            return Err(AppError::Conflict("nickname_taken".into()));
        }
        tables.profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn find_by_member(&self, member_id: &str) -> AppResult<Option<Profile>> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .values()
            .find(|p| p.member == member_id)
            .cloned())
    }

    async fn find_by_nick_name(&self, nick_name: &str) -> AppResult<Option<Profile>> {
        let nick_name = nick_name.to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .values()
            .find(|p| p.nick_name == nick_name)
            .cloned())
    }
}

#[async_trait]
impl VerificationCodeRepository for MemoryStore {
    async fn replace_for_member(&self, code: &VerificationCode) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.codes.retain(|c| c.member != code.member);
        tables.codes.push(code.clone());
        Ok(())
    }

    async fn find_untaken(
        &self,
        member_id: &str,
        code: &str,
        code_type: i16,
    ) -> AppResult<Option<VerificationCode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .codes
            .iter()
            .find(|c| {
                c.member == member_id && c.code == code && c.code_type == code_type && !c.taken
            })
            .cloned())
    }

    async fn mark_taken(&self, id: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(code) = tables.codes.iter_mut().find(|c| c.id == id) {
            code.taken = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_keeps_one_row_per_pair() {
        let store = MemoryStore::new();
        let to = vec!["B".to_string()];
        store.upsert_mailbox("A", &to, "first", true).await.unwrap();
        store.upsert_mailbox("A", &to, "second", false).await.unwrap();

        let rows = store.list("A").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "second");
        assert!(!rows[0].is_read);
        assert_eq!(store.unread_count("A").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_only_touches_matching_row() {
        let store = MemoryStore::new();
        store.upsert_mailbox("A", &["B".into()], "x", false).await.unwrap();
        store.upsert_mailbox("A", &["C".into()], "y", false).await.unwrap();

        assert_eq!(store.mark_read("A", "B").await.unwrap(), 1);
        assert_eq!(store.unread_count("A").await.unwrap(), 1);
        assert_eq!(store.mark_read("A", "B").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_with_profiles() {
        let store = MemoryStore::new();
        let bob = Profile::default_for("m-bob", "bob@example.com", "Bob", "");
        ProfileRepository::create(&store, &bob).await.unwrap();

        store.upsert_mailbox("A", &["C".into()], "older", true).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .upsert_mailbox("A", &[bob.id.clone()], "newer", true)
            .await
            .unwrap();

        let rows = store.list("A").await.unwrap();
        assert_eq!(rows[0].message, "newer");
        assert_eq!(rows[0].receiver, vec![bob]);
        assert!(rows[1].receiver.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        MemberRepository::create(&store, &Member::prepare("ann@example.com"))
            .await
            .unwrap();
        let err = MemberRepository::create(&store, &Member::prepare("ANN@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref c) if c == "email_taken"));
    }

    #[tokio::test]
    async fn test_replacing_codes_drops_old_ones() {
        let store = MemoryStore::new();
        let first = VerificationCode::generate("m1", "m1@example.com", 1);
        let second = VerificationCode::generate("m1", "m1@example.com", 1);
        store.replace_for_member(&first).await.unwrap();
        store.replace_for_member(&second).await.unwrap();

        if first.code != second.code {
            assert!(store.find_untaken("m1", &first.code, 1).await.unwrap().is_none());
        }
        let found = store.find_untaken("m1", &second.code, 1).await.unwrap().unwrap();
        store.mark_taken(&found.id).await.unwrap();
        assert!(store.find_untaken("m1", &second.code, 1).await.unwrap().is_none());
    }
}
