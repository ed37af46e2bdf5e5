//! Semantic analytics messages.
//!
//! One struct per event type. A message is validated and normalized when it
//! is enqueued: missing `timestamp`, `messageId` and `context.library` are
//! filled in and the `type` discriminator is added, producing the JSON
//! object that travels through the queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{ClientError, ValidationError};

/// JSON object used for `context`, `properties`, `traits` and `integrations`.
pub type Properties = Map<String, Value>;

/// Fields shared by every message type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Common {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,

    pub context: Properties,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    pub integrations: Properties,
}

impl Common {
    fn has_identity(&self) -> bool {
        non_empty(&self.user_id) || non_empty(&self.anonymous_id)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn require_identity(kind: &'static str, common: &Common) -> Result<(), ValidationError> {
    if common.has_identity() {
        Ok(())
    } else {
        Err(ValidationError::MissingIdentity { kind })
    }
}

/// Behaviour common to all message types.
pub trait Message: Serialize + Sized {
    /// Value of the `type` field.
    const KIND: &'static str;

    fn common(&self) -> &Common;

    fn common_mut(&mut self) -> &mut Common;

    /// Check the fields this message type requires.
    fn validate(&self) -> Result<(), ValidationError> {
        require_identity(Self::KIND, self.common())
    }

    /// Validate, fill defaults, and convert to the queued JSON form.
    ///
    /// Returns the message id alongside the event.
    fn into_event(mut self) -> Result<(String, Value), ClientError> {
        self.validate()?;

        let common = self.common_mut();
        common.timestamp.get_or_insert_with(Utc::now);
        let message_id = common
            .message_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        common.context.entry("library").or_insert_with(|| {
            json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            })
        });

        let mut event = serde_json::to_value(&self)?;
        if let Value::Object(fields) = &mut event {
            fields.insert("type".to_string(), Value::String(Self::KIND.to_string()));
        }

        Ok((message_id, event))
    }
}

/// Builder methods for the shared fields.
macro_rules! common_builders {
    ($ty:ty) => {
        impl $ty {
            pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
                self.common.user_id = Some(user_id.into());
                self
            }

            pub fn anonymous_id(mut self, anonymous_id: impl Into<String>) -> Self {
                self.common.anonymous_id = Some(anonymous_id.into());
                self
            }

            pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.common.context.insert(key.into(), value.into());
                self
            }

            pub fn integration(mut self, name: impl Into<String>, enabled: bool) -> Self {
                self.common.integrations.insert(name.into(), Value::Bool(enabled));
                self
            }

            /// Override the event time (defaults to enqueue time).
            pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
                self.common.timestamp = Some(timestamp);
                self
            }

            /// Supply the message id instead of generating one.
            pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
                self.common.message_id = Some(message_id.into());
                self
            }
        }
    };
}

/// An action performed by a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Track {
    pub event: String,
    pub properties: Properties,
    #[serde(flatten)]
    pub common: Common,
}

impl Track {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Message for Track {
    const KIND: &'static str = "track";

    fn common(&self) -> &Common {
        &self.common
    }

    fn common_mut(&mut self) -> &mut Common {
        &mut self.common
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_identity(Self::KIND, &self.common)?;
        if self.event.is_empty() {
            return Err(ValidationError::MissingField {
                kind: Self::KIND,
                field: "event",
            });
        }
        Ok(())
    }
}

/// Ties a user to their traits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identify {
    pub traits: Properties,
    #[serde(flatten)]
    pub common: Common,
}

impl Identify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traits(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }
}

impl Message for Identify {
    const KIND: &'static str = "identify";

    fn common(&self) -> &Common {
        &self.common
    }

    fn common_mut(&mut self) -> &mut Common {
        &mut self.common
    }
}

/// Associates a user with a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: String,
    pub traits: Properties,
    #[serde(flatten)]
    pub common: Common,
}

impl Group {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn traits(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }
}

impl Message for Group {
    const KIND: &'static str = "group";

    fn common(&self) -> &Common {
        &self.common
    }

    fn common_mut(&mut self) -> &mut Common {
        &mut self.common
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_identity(Self::KIND, &self.common)?;
        if self.group_id.is_empty() {
            return Err(ValidationError::MissingField {
                kind: Self::KIND,
                field: "group_id",
            });
        }
        Ok(())
    }
}

/// Merges a previous identity into `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    pub previous_id: String,
    #[serde(flatten)]
    pub common: Common,
}

impl Alias {
    pub fn new(previous_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            previous_id: previous_id.into(),
            common: Common {
                user_id: Some(user_id.into()),
                ..Default::default()
            },
        }
    }
}

impl Message for Alias {
    const KIND: &'static str = "alias";

    fn common(&self) -> &Common {
        &self.common
    }

    fn common_mut(&mut self) -> &mut Common {
        &mut self.common
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.previous_id.is_empty() {
            return Err(ValidationError::MissingField {
                kind: Self::KIND,
                field: "previous_id",
            });
        }
        if !non_empty(&self.common.user_id) {
            return Err(ValidationError::MissingField {
                kind: Self::KIND,
                field: "user_id",
            });
        }
        Ok(())
    }
}

/// A web page view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub properties: Properties,
    #[serde(flatten)]
    pub common: Common,
}

impl Page {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Message for Page {
    const KIND: &'static str = "page";

    fn common(&self) -> &Common {
        &self.common
    }

    fn common_mut(&mut self) -> &mut Common {
        &mut self.common
    }
}

/// A mobile screen view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Screen {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub properties: Properties,
    #[serde(flatten)]
    pub common: Common,
}

impl Screen {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Message for Screen {
    const KIND: &'static str = "screen";

    fn common(&self) -> &Common {
        &self.common
    }

    fn common_mut(&mut self) -> &mut Common {
        &mut self.common
    }
}

common_builders!(Track);
common_builders!(Identify);
common_builders!(Group);
common_builders!(Alias);
common_builders!(Page);
common_builders!(Screen);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_track_serialization() {
        let (id, event) = Track::new("python event")
            .user_id("userId")
            .property("property", "value")
            .into_event()
            .unwrap();

        assert_eq!(event["type"], "track");
        assert_eq!(event["event"], "python event");
        assert_eq!(event["userId"], "userId");
        assert_eq!(event["properties"]["property"], "value");
        assert_eq!(event["messageId"], id.as_str());
        assert!(event.get("anonymousId").is_none());
        assert!(event["integrations"].as_object().unwrap().is_empty());
        assert!(event["timestamp"].is_string());
    }

    #[test]
    fn test_defaults_are_filled() {
        let (id, event) = Identify::new().anonymous_id("anon").into_event().unwrap();

        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(event["type"], "identify");
        assert_eq!(event["context"]["library"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(event["context"]["library"]["version"], env!("CARGO_PKG_VERSION"));
        assert!(event["traits"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_supplied_fields_are_kept() {
        let timestamp = Utc.with_ymd_and_hms(2014, 9, 3, 0, 0, 0).unwrap();
        let (id, event) = Page::new("home")
            .user_id("userId")
            .message_id("messageId")
            .timestamp(timestamp)
            .context("ip", "192.168.0.1")
            .context("library", json!({"name": "custom"}))
            .integration("Amplitude", false)
            .into_event()
            .unwrap();

        assert_eq!(id, "messageId");
        assert_eq!(event["timestamp"], "2014-09-03T00:00:00Z");
        assert_eq!(event["context"]["ip"], "192.168.0.1");
        assert_eq!(event["context"]["library"], json!({"name": "custom"}));
        assert_eq!(event["integrations"]["Amplitude"], false);
        assert_eq!(event["name"], "home");
    }

    #[test]
    fn test_identity_required() {
        let err = Track::new("event").into_event().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::MissingIdentity { kind: "track" })
        ));

        let err = Screen::new("main").user_id("").into_event().unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn test_track_requires_event() {
        let err = Track::new("").user_id("userId").validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: "track",
                field: "event"
            }
        );
    }

    #[test]
    fn test_group_requires_group_id() {
        assert!(Group::new("").user_id("userId").validate().is_err());

        let (_, event) = Group::new("groupId")
            .user_id("userId")
            .traits("name", "Acme")
            .into_event()
            .unwrap();
        assert_eq!(event["type"], "group");
        assert_eq!(event["groupId"], "groupId");
        assert_eq!(event["traits"]["name"], "Acme");
    }

    #[test]
    fn test_alias_requires_both_ids() {
        let err = Alias::new("", "userId").validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: "alias",
                field: "previous_id"
            }
        );

        let err = Alias::new("previousId", "").validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: "alias",
                field: "user_id"
            }
        );

        let (_, event) = Alias::new("previousId", "userId").into_event().unwrap();
        assert_eq!(event["previousId"], "previousId");
        assert_eq!(event["userId"], "userId");
    }

    #[test]
    fn test_screen_category() {
        let (_, event) = Screen::new("main")
            .category("settings")
            .anonymous_id("anon")
            .property("theme", "dark")
            .into_event()
            .unwrap();
        assert_eq!(event["type"], "screen");
        assert_eq!(event["category"], "settings");
        assert_eq!(event["properties"]["theme"], "dark");
    }
}
