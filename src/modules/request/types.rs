use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommerceItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_fields: Option<Value>,
}

impl CommerceItem {
    pub fn new(id: &str, name: &str, price: f64, quantity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            quantity,
            sku: None,
            description: None,
            url: None,
            image_url: None,
            categories: None,
            data_fields: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InAppLocation {
    #[serde(rename = "in-app")]
    InApp,
    #[serde(rename = "inbox")]
    Inbox,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InAppCloseSource {
    #[serde(rename = "back")]
    Back,
    #[serde(rename = "link")]
    Link,
    #[serde(rename = "other")]
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InAppDeleteSource {
    #[serde(rename = "inbox-swipe")]
    InboxSwipe,
    #[serde(rename = "delete-button")]
    DeleteButton,
    #[serde(rename = "other")]
    Unknown,
}

/// Where and how an in-app message was shown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InAppMessageContext {
    pub message_id: String,
    pub save_to_inbox: bool,
    pub silent_inbox: bool,
    pub location: Option<InAppLocation>,
    pub inbox_session_id: Option<String>,
}

impl InAppMessageContext {
    pub fn new(message_id: &str, location: Option<InAppLocation>) -> Self {
        Self {
            message_id: message_id.into(),
            location,
            ..Default::default()
        }
    }

    pub fn as_json(&self) -> Value {
        let mut context = Map::new();
        context.insert("saveToInbox".into(), json!(self.save_to_inbox));
        context.insert("silentInbox".into(), json!(self.silent_inbox));
        if let Some(location) = self.location {
            context.insert("location".into(), json!(location));
        }
        if let Some(session_id) = &self.inbox_session_id {
            context.insert("inboxSessionId".into(), json!(session_id));
        }
        Value::Object(context)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxImpression {
    pub message_id: String,
    pub silent_inbox: bool,
    pub display_count: u32,
    pub display_duration: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InboxSession {
    pub id: Option<String>,
    /// Milliseconds.
    pub session_start_time: i64,
    pub session_end_time: i64,
    pub start_total_message_count: u32,
    pub start_unread_message_count: u32,
    pub end_total_message_count: u32,
    pub end_unread_message_count: u32,
    pub impressions: Vec<InboxImpression>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbeddedMessage {
    pub message_id: String,
    pub placement_id: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedImpression {
    pub message_id: String,
    pub placement_id: i64,
    pub display_count: u32,
    pub duration: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedSession {
    pub id: String,
    pub start: i64,
    pub end: i64,
    pub impressions: Vec<EmbeddedImpression>,
}
