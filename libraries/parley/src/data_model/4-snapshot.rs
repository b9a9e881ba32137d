//! # Snapshot
//! A point-in-time view of every chat and user the client knows about.
//!
//! Snapshots are never modified once handed out. Every "modification" builds a new snapshot that
//! shares structure with the old one, so cloning is cheap and holding on to an old snapshot
//! keeps it exactly as it was.

use std::hash::Hash;

use crate::data_model::{Chat, ChatId, User, UserId};

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    chats: im::HashMap<ChatId, Chat>,
    users: im::HashMap<UserId, User>,
}

impl Snapshot {
    pub fn chats(&self) -> &im::HashMap<ChatId, Chat> {
        &self.chats
    }

    pub fn users(&self) -> &im::HashMap<UserId, User> {
        &self.users
    }

    pub fn chat(&self, id: &ChatId) -> Option<&Chat> {
        self.chats.get(id)
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Replaces every chat with the given list.
    pub fn with_chats(&self, chats: impl IntoIterator<Item = Chat>) -> Self {
        Self {
            chats: index_by(chats, |chat| chat.id().clone()),
            users: self.users.clone(),
        }
    }

    /// Replaces every user with the given list.
    pub fn with_users(&self, users: impl IntoIterator<Item = User>) -> Self {
        Self {
            chats: self.chats.clone(),
            users: index_by(users, |user| user.id.clone()),
        }
    }

    pub(crate) fn with_chat(&self, chat: Chat) -> Self {
        Self {
            chats: self.chats.update(chat.id().clone(), chat),
            users: self.users.clone(),
        }
    }
}

/// Turns a list into a map keyed by `key`. If two items share a key, the later one wins.
pub fn index_by<K, V>(items: impl IntoIterator<Item = V>, key: impl Fn(&V) -> K) -> im::HashMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    let mut map = im::HashMap::new();
    for item in items {
        map.insert(key(&item), item);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_by_last_write_wins() {
        let users = vec![
            User::new(UserId::from("u1"), "first"),
            User::new(UserId::from("u2"), "other"),
            User::new(UserId::from("u1"), "second"),
        ];
        let snapshot = Snapshot::default().with_users(users);

        assert_eq!(snapshot.users().len(), 2);
        assert_eq!(snapshot.user(&UserId::from("u1")).unwrap().display_name, "second");
    }

    #[test]
    fn test_replacing_users_keeps_chats() {
        let snapshot = Snapshot::default()
            .with_chats(vec![Chat::new(ChatId::from("c1"), "A", vec![])])
            .with_users(vec![User::new(UserId::from("u1"), "ann")]);
        let refreshed = snapshot.with_users(vec![User::new(UserId::from("u2"), "bob")]);

        assert!(refreshed.chat(&ChatId::from("c1")).is_some());
        assert!(refreshed.user(&UserId::from("u1")).is_none());
        assert!(snapshot.user(&UserId::from("u1")).is_some());
    }
}
