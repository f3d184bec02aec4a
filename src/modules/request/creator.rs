// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde_json::{json, Map, Value};

use crate::modules::{
    error::{code::ErrorCode, PushlineResult},
    request::{
        model::{DeviceMetadata, Identity, SdkRequest},
        types::{
            CommerceItem, EmbeddedMessage, EmbeddedSession, InAppCloseSource, InAppDeleteSource,
            InAppMessageContext, InboxSession,
        },
    },
    utils::validate_not_empty,
};
use crate::raise_error;

pub const PATH_TRACK_EVENT: &str = "events/track";
pub const PATH_UPDATE_CART: &str = "commerce/updateCart";
pub const PATH_TRACK_PURCHASE: &str = "commerce/trackPurchase";
pub const PATH_TRACK_PUSH_OPEN: &str = "events/trackPushOpen";
pub const PATH_TRACK_INAPP_OPEN: &str = "events/trackInAppOpen";
pub const PATH_TRACK_INAPP_CLICK: &str = "events/trackInAppClick";
pub const PATH_TRACK_INAPP_CLOSE: &str = "events/trackInAppClose";
pub const PATH_TRACK_INAPP_DELIVERY: &str = "events/trackInAppDelivery";
pub const PATH_INAPP_CONSUME: &str = "events/inAppConsume";
pub const PATH_TRACK_INBOX_SESSION: &str = "events/trackInboxSession";
pub const PATH_EMBEDDED_RECEIVED: &str = "embedded-messaging/events/received";
pub const PATH_EMBEDDED_CLICK: &str = "embedded-messaging/events/click";
pub const PATH_EMBEDDED_DISMISS: &str = "embedded-messaging/events/dismiss";
pub const PATH_EMBEDDED_IMPRESSION: &str = "embedded-messaging/events/impression";
pub const PATH_EMBEDDED_SESSION: &str = "embedded-messaging/events/session";

/// Builds typed API requests for the current identity.
pub struct RequestCreator {
    identity: Identity,
    device_metadata: DeviceMetadata,
}

impl RequestCreator {
    pub fn new(identity: Identity, device_metadata: DeviceMetadata) -> Self {
        Self {
            identity,
            device_metadata,
        }
    }

    fn user_body(&self) -> PushlineResult<Map<String, Value>> {
        if !self.identity.is_known() {
            return Err(raise_error!(
                "Both email and userId are unset, the request cannot be sent.".into(),
                ErrorCode::MissingIdentity
            ));
        }
        let mut body = Map::new();
        self.identity.add_to(&mut body, "email", "userId");
        Ok(body)
    }

    fn nested_user(&self) -> PushlineResult<Value> {
        Ok(Value::Object(self.user_body()?))
    }

    fn in_app_body(&self, context: &InAppMessageContext) -> PushlineResult<Map<String, Value>> {
        validate_not_empty(&context.message_id, "messageId")?;
        let mut body = self.user_body()?;
        body.insert("messageId".into(), json!(context.message_id));
        body.insert("inAppMessageContext".into(), context.as_json());
        body.insert("deviceInfo".into(), self.device_metadata.as_json());
        if let Some(session_id) = &context.inbox_session_id {
            body.insert("inboxSessionId".into(), json!(session_id));
        }
        Ok(body)
    }

    fn embedded_body(&self, message: &EmbeddedMessage) -> PushlineResult<Map<String, Value>> {
        validate_not_empty(&message.message_id, "messageId")?;
        let mut body = self.user_body()?;
        body.insert("messageId".into(), json!(message.message_id));
        body.insert("placementId".into(), json!(message.placement_id));
        body.insert("deviceInfo".into(), self.device_metadata.as_json());
        Ok(body)
    }

    pub fn create_track_event_request(
        &self,
        event_name: &str,
        data_fields: Option<Value>,
    ) -> PushlineResult<SdkRequest> {
        validate_not_empty(event_name, "eventName")?;
        let mut body = self.user_body()?;
        body.insert("eventName".into(), json!(event_name));
        if let Some(data_fields) = data_fields {
            body.insert("dataFields".into(), data_fields);
        }
        Ok(SdkRequest::post(PATH_TRACK_EVENT, Value::Object(body)))
    }

    pub fn create_update_cart_request(&self, items: &[CommerceItem]) -> PushlineResult<SdkRequest> {
        let body = json!({
            "user": self.nested_user()?,
            "items": items,
        });
        Ok(SdkRequest::post(PATH_UPDATE_CART, body))
    }

    pub fn create_track_purchase_request(
        &self,
        total: f64,
        items: &[CommerceItem],
        data_fields: Option<Value>,
    ) -> PushlineResult<SdkRequest> {
        let mut body = Map::new();
        body.insert("user".into(), self.nested_user()?);
        body.insert("items".into(), json!(items));
        body.insert("total".into(), json!(total));
        if let Some(data_fields) = data_fields {
            body.insert("dataFields".into(), data_fields);
        }
        Ok(SdkRequest::post(PATH_TRACK_PURCHASE, Value::Object(body)))
    }

    pub fn create_track_push_open_request(
        &self,
        campaign_id: i64,
        template_id: Option<i64>,
        message_id: &str,
        app_already_running: bool,
        data_fields: Option<Value>,
    ) -> PushlineResult<SdkRequest> {
        let mut body = self.user_body()?;
        let mut fields = match data_fields {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        fields.insert("appAlreadyRunning".into(), json!(app_already_running));

        body.insert("campaignId".into(), json!(campaign_id));
        if let Some(template_id) = template_id {
            body.insert("templateId".into(), json!(template_id));
        }
        body.insert("messageId".into(), json!(message_id));
        body.insert("dataFields".into(), Value::Object(fields));
        Ok(SdkRequest::post(PATH_TRACK_PUSH_OPEN, Value::Object(body)))
    }

    pub fn create_track_in_app_open_request(
        &self,
        context: &InAppMessageContext,
    ) -> PushlineResult<SdkRequest> {
        let body = self.in_app_body(context)?;
        Ok(SdkRequest::post(PATH_TRACK_INAPP_OPEN, Value::Object(body)))
    }

    pub fn create_track_in_app_click_request(
        &self,
        context: &InAppMessageContext,
        clicked_url: &str,
    ) -> PushlineResult<SdkRequest> {
        validate_not_empty(clicked_url, "clickedUrl")?;
        let mut body = self.in_app_body(context)?;
        body.insert("clickedUrl".into(), json!(clicked_url));
        Ok(SdkRequest::post(PATH_TRACK_INAPP_CLICK, Value::Object(body)))
    }

    pub fn create_track_in_app_close_request(
        &self,
        context: &InAppMessageContext,
        source: Option<InAppCloseSource>,
        clicked_url: Option<&str>,
    ) -> PushlineResult<SdkRequest> {
        let mut body = self.in_app_body(context)?;
        if let Some(source) = source {
            body.insert("closeAction".into(), json!(source));
        }
        if let Some(clicked_url) = clicked_url {
            body.insert("clickedUrl".into(), json!(clicked_url));
        }
        Ok(SdkRequest::post(PATH_TRACK_INAPP_CLOSE, Value::Object(body)))
    }

    pub fn create_track_in_app_delivery_request(
        &self,
        context: &InAppMessageContext,
    ) -> PushlineResult<SdkRequest> {
        let body = self.in_app_body(context)?;
        Ok(SdkRequest::post(PATH_TRACK_INAPP_DELIVERY, Value::Object(body)))
    }

    pub fn create_in_app_consume_request(&self, message_id: &str) -> PushlineResult<SdkRequest> {
        validate_not_empty(message_id, "messageId")?;
        let mut body = self.user_body()?;
        body.insert("messageId".into(), json!(message_id));
        Ok(SdkRequest::post(PATH_INAPP_CONSUME, Value::Object(body)))
    }

    pub fn create_track_in_app_consume_request(
        &self,
        context: &InAppMessageContext,
        source: Option<InAppDeleteSource>,
    ) -> PushlineResult<SdkRequest> {
        let mut body = self.in_app_body(context)?;
        if let Some(source) = source {
            body.insert("deleteAction".into(), json!(source));
        }
        Ok(SdkRequest::post(PATH_INAPP_CONSUME, Value::Object(body)))
    }

    pub fn create_track_inbox_session_request(
        &self,
        session: &InboxSession,
    ) -> PushlineResult<SdkRequest> {
        if session.session_end_time < session.session_start_time {
            return Err(raise_error!(
                "Inbox session ends before it starts.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let mut body = self.user_body()?;
        if let Some(id) = &session.id {
            body.insert("inboxSessionId".into(), json!(id));
        }
        body.insert("inboxSessionStart".into(), json!(session.session_start_time));
        body.insert("inboxSessionEnd".into(), json!(session.session_end_time));
        body.insert(
            "startTotalMessageCount".into(),
            json!(session.start_total_message_count),
        );
        body.insert(
            "startUnreadMessageCount".into(),
            json!(session.start_unread_message_count),
        );
        body.insert(
            "endTotalMessageCount".into(),
            json!(session.end_total_message_count),
        );
        body.insert(
            "endUnreadMessageCount".into(),
            json!(session.end_unread_message_count),
        );
        body.insert("impressions".into(), json!(session.impressions));
        body.insert("deviceInfo".into(), self.device_metadata.as_json());
        Ok(SdkRequest::post(PATH_TRACK_INBOX_SESSION, Value::Object(body)))
    }

    pub fn create_embedded_message_received_request(
        &self,
        message: &EmbeddedMessage,
    ) -> PushlineResult<SdkRequest> {
        let body = self.embedded_body(message)?;
        Ok(SdkRequest::post(PATH_EMBEDDED_RECEIVED, Value::Object(body)))
    }

    pub fn create_embedded_message_click_request(
        &self,
        message: &EmbeddedMessage,
        button_identifier: Option<&str>,
        clicked_url: &str,
    ) -> PushlineResult<SdkRequest> {
        let mut body = self.embedded_body(message)?;
        if let Some(button_identifier) = button_identifier {
            body.insert("buttonIdentifier".into(), json!(button_identifier));
        }
        body.insert("targetUrl".into(), json!(clicked_url));
        Ok(SdkRequest::post(PATH_EMBEDDED_CLICK, Value::Object(body)))
    }

    pub fn create_embedded_message_dismiss_request(
        &self,
        message: &EmbeddedMessage,
    ) -> PushlineResult<SdkRequest> {
        let body = self.embedded_body(message)?;
        Ok(SdkRequest::post(PATH_EMBEDDED_DISMISS, Value::Object(body)))
    }

    pub fn create_embedded_message_impression_request(
        &self,
        message: &EmbeddedMessage,
    ) -> PushlineResult<SdkRequest> {
        let body = self.embedded_body(message)?;
        Ok(SdkRequest::post(PATH_EMBEDDED_IMPRESSION, Value::Object(body)))
    }

    pub fn create_track_embedded_session_request(
        &self,
        session: &EmbeddedSession,
    ) -> PushlineResult<SdkRequest> {
        validate_not_empty(&session.id, "session.id")?;
        let mut body = self.user_body()?;
        body.insert(
            "session".into(),
            json!({
                "id": session.id,
                "start": session.start,
                "end": session.end,
            }),
        );
        body.insert("impressions".into(), json!(session.impressions));
        body.insert("deviceInfo".into(), self.device_metadata.as_json());
        Ok(SdkRequest::post(PATH_EMBEDDED_SESSION, Value::Object(body)))
    }
}
