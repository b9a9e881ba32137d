//! # Entities
//! Chats, messages and users as the server sends them.
//!
//! The server identifies everything with an `_id` field, and when asked to `populate` it inlines
//! whole user objects where it would otherwise send a user id. We accept both shapes and only
//! keep the id, since users are tracked separately in the snapshot. Documents may also carry an
//! `id` copy of `_id`; `_id` wins and the copy goes to `extra`.
//!
//! Fields we don't model are kept in `extra`, so a richer payload survives a round trip untouched.
//! Each entity is decoded through a lenient `Wire*` shape first, then converted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::data_model::{ChatId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireChat")]
pub struct Chat {
    #[serde(rename = "_id")]
    id: ChatId,
    name: String,
    members: im::OrdSet<UserId>,
    /// Append order is the order the server delivered them in.
    messages: im::Vector<Message>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Chat {
    pub fn new(id: ChatId, name: impl Into<String>, members: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            id,
            name: name.into(),
            members: members.into_iter().collect(),
            messages: im::Vector::new(),
            extra: Map::new(),
        }
    }

    pub fn id(&self) -> &ChatId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &im::OrdSet<UserId> {
        &self.members
    }

    pub fn messages(&self) -> &im::Vector<Message> {
        &self.messages
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Returns a copy of this chat with `message` appended. The original is left as it was.
    pub(crate) fn with_message(&self, message: Message) -> Self {
        let mut chat = self.clone();
        chat.messages.push_back(message);
        chat
    }
}

#[derive(Deserialize)]
struct WireChat {
    #[serde(rename = "_id", default)]
    underscore_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_members")]
    members: im::OrdSet<UserId>,
    #[serde(default)]
    messages: im::Vector<Message>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<WireChat> for Chat {
    type Error = String;

    fn try_from(wire: WireChat) -> Result<Self, Self::Error> {
        let mut extra = wire.extra;
        let id = identity(wire.underscore_id, wire.id, &mut extra)?;
        Ok(Self {
            id: ChatId::from(id),
            name: wire.name.unwrap_or_default(),
            members: wire.members,
            messages: wire.messages,
            extra,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMessage")]
pub struct Message {
    #[serde(rename = "sender", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    pub text: String,
    /// `None` when absent or unreadable. An unreadable timestamp is kept in `extra`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            sender_id: None,
            text: text.into(),
            timestamp: None,
            extra: Map::new(),
        }
    }
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default, deserialize_with = "deserialize_optional_user")]
    sender: Option<UserId>,
    #[serde(rename = "senderId", default, deserialize_with = "deserialize_optional_user")]
    sender_id: Option<UserId>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let mut extra = wire.extra;
        let timestamp = match wire.timestamp {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let parsed = parse_timestamp(&raw);
                if parsed.is_none() {
                    extra.insert("timestamp".to_string(), raw);
                }
                parsed
            }
        };
        Self {
            sender_id: wire.sender.or(wire.sender_id),
            text: wire.text.unwrap_or_default(),
            timestamp,
            extra,
        }
    }
}

/// RFC 3339 strings, or milliseconds since the epoch.
fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc)),
        Value::Number(millis) => millis
            .as_i64()
            .or_else(|| millis.as_f64().map(|fractional| fractional as i64))
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireUser")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Deserialize)]
struct WireUser {
    #[serde(rename = "_id", default)]
    underscore_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<WireUser> for User {
    type Error = String;

    fn try_from(wire: WireUser) -> Result<Self, Self::Error> {
        let mut extra = wire.extra;
        let id = identity(wire.underscore_id, wire.id, &mut extra)?;

        // first one present wins, the others are kept as they came
        let mut names = [
            ("displayName", wire.display_name),
            ("username", wire.username),
            ("name", wire.name),
        ]
        .into_iter()
        .filter_map(|(key, name)| name.map(|name| (key, name)));
        let display_name = names.next().map(|(_, name)| name).unwrap_or_default();
        for (key, name) in names {
            extra.insert(key.to_string(), Value::String(name));
        }

        Ok(Self {
            id: UserId::from(id),
            display_name,
            extra,
        })
    }
}

fn identity(
    underscore_id: Option<String>,
    id: Option<String>,
    extra: &mut Map<String, Value>,
) -> Result<String, String> {
    match (underscore_id, id) {
        (Some(underscore_id), Some(id)) => {
            extra.insert("id".to_string(), Value::String(id));
            Ok(underscore_id)
        }
        (Some(id), None) | (None, Some(id)) => Ok(id),
        (None, None) => Err("missing field `_id`".to_string()),
    }
}

/// Either a bare user id or a populated user object.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserRef {
    Id(UserId),
    Populated {
        #[serde(rename = "_id", default)]
        underscore_id: Option<UserId>,
        #[serde(default)]
        id: Option<UserId>,
    },
}

impl UserRef {
    fn into_id(self) -> Option<UserId> {
        match self {
            UserRef::Id(id) => Some(id),
            UserRef::Populated { underscore_id, id } => underscore_id.or(id),
        }
    }
}

/// Members without any id are skipped instead of failing the whole chat.
fn deserialize_members<'de, D>(deserializer: D) -> Result<im::OrdSet<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    let members = Vec::<UserRef>::deserialize(deserializer)?;
    Ok(members
        .into_iter()
        .filter_map(|member| {
            let id = member.into_id();
            if id.is_none() {
                log::warn!("Skipping chat member without an id");
            }
            id
        })
        .collect())
}

fn deserialize_optional_user<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<UserRef>::deserialize(deserializer)?.and_then(UserRef::into_id))
}
