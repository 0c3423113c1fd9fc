//! Reports API activity records and their interpretation.
//!
//! Interpretation is pure: [`interpret_admin`] turns one admin activity into
//! [`PendingChange`]s that still name resources by email, and the feed
//! resolves those to durable ids afterwards. [`interpret_usage`] needs no
//! resolution and yields events directly.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use tracing::debug;
use wsconnect_core::{ActorRef, NormalizedEvent, ResourceRef, ResourceType, parse_activity_time};

use crate::error::{SyncError, SyncResult};

/// Application name of the admin console audit log.
pub const ADMIN_APPLICATION: &str = "admin";
/// Application name of the OAuth token audit log.
pub const TOKEN_APPLICATION: &str = "token";
/// Token audit event emitted when a user authorizes an app.
pub const AUTHORIZE_EVENT: &str = "authorize";

/// Client ids of Google's own first-party apps: a bare project number,
/// optionally with the standard client id suffix.
static PRIVATE_APP_CLIENT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.apps\.googleusercontent\.com)?$").expect("valid regex")
});

/// One record from `activities.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: ActivityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actor: Actor,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<ActivityEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityId {
    /// Kept raw; a number, null or garbage here degrades in [`Activity::occurred_at`].
    #[serde(default, deserialize_with = "string_or_number")]
    pub time: String,
    /// Documented as int64, sent as a JSON string; numbers are accepted too.
    #[serde(default, deserialize_with = "string_or_number")]
    pub unique_qualifier: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub application_name: String,
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub email: Option<String>,
    pub profile_id: Option<String>,
}

/// A raw sub-event: `type` is the category, `name` the event itself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(rename = "type", default, deserialize_with = "string_or_number")]
    pub category: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Vec<EventParameter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParameter {
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi_value: Vec<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub int_value: Option<String>,
}

impl ActivityEvent {
    /// Returns a parameter's value, ignoring blank ones.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref().or(p.int_value.as_deref()))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

impl Activity {
    /// When the activity happened, degraded per [`parse_activity_time`].
    pub fn occurred_at(&self) -> DateTime<Utc> {
        parse_activity_time(&self.id.time)
    }
}

/// One page of `activities.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Activity>,
    pub next_page_token: Option<String>,
}

/// Parameters of one `activities.list` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityQuery {
    pub application: String,
    pub customer_id: Option<String>,
    /// Sent only when opening a window.
    pub start_time: Option<DateTime<Utc>>,
    pub page_token: Option<String>,
    pub max_results: u32,
    pub event_name: Option<String>,
}

impl ActivityQuery {
    pub fn new(application: impl Into<String>, max_results: u32) -> Self {
        Self {
            application: application.into(),
            customer_id: None,
            start_time: None,
            page_token: None,
            max_results,
            event_name: None,
        }
    }

    /// Query string pairs, in a stable order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(customer_id) = &self.customer_id {
            pairs.push(("customerId", customer_id.clone()));
        }
        if let Some(start) = self.start_time {
            pairs.push((
                "startTime",
                start.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        if let Some(token) = &self.page_token {
            pairs.push(("pageToken", token.clone()));
        }
        pairs.push(("maxResults", self.max_results.to_string()));
        if let Some(event_name) = &self.event_name {
            pairs.push(("eventName", event_name.clone()));
        }
        pairs
    }
}

/// A change that still names its resource by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub resource_type: ResourceType,
    pub email: String,
}

impl PendingChange {
    fn new(resource_type: ResourceType, email: &str) -> Self {
        Self {
            resource_type,
            email: email.to_string(),
        }
    }
}

/// Interprets an admin audit activity.
///
/// Each sub-event is dispatched on `(category, name)`. Pairs outside the
/// table, deletions (the resource can no longer be resolved) and sub-events
/// missing the parameter they need yield nothing.
pub fn interpret_admin(activity: &Activity) -> Vec<PendingChange> {
    let mut changes = Vec::new();

    for event in &activity.events {
        let before = changes.len();
        match (event.category.as_str(), event.name.as_str()) {
            (
                "GROUP_SETTINGS",
                "CREATE_GROUP" | "CHANGE_GROUP_NAME" | "CHANGE_GROUP_DESCRIPTION"
                | "CHANGE_GROUP_SETTING",
            ) => {
                push(&mut changes, event, ResourceType::Group, "GROUP_EMAIL");
            }
            ("GROUP_SETTINGS", "CHANGE_GROUP_EMAIL") => {
                push(&mut changes, event, ResourceType::Group, "GROUP_EMAIL");
                push(&mut changes, event, ResourceType::Group, "NEW_VALUE");
            }
            (
                "GROUP_SETTINGS",
                "ADD_GROUP_MEMBER" | "REMOVE_GROUP_MEMBER" | "UPDATE_GROUP_MEMBER",
            ) => {
                push(&mut changes, event, ResourceType::Group, "GROUP_EMAIL");
                push(&mut changes, event, ResourceType::User, "USER_EMAIL");
            }
            (
                "USER_SETTINGS",
                "CREATE_USER" | "SUSPEND_USER" | "UNSUSPEND_USER" | "GRANT_ADMIN_PRIVILEGE"
                | "REVOKE_ADMIN_PRIVILEGE" | "MOVE_USER_TO_ORG_UNIT" | "CHANGE_FIRST_NAME"
                | "CHANGE_LAST_NAME",
            ) => {
                push(&mut changes, event, ResourceType::User, "USER_EMAIL");
            }
            ("USER_SETTINGS", "RENAME_USER") => {
                push(&mut changes, event, ResourceType::User, "USER_EMAIL");
                push(&mut changes, event, ResourceType::User, "NEW_VALUE");
            }
            (category, name) => {
                debug!(
                    qualifier = %activity.id.unique_qualifier,
                    %category,
                    %name,
                    "skipping admin event outside the allow-list"
                );
                continue;
            }
        }
        if changes.len() == before {
            debug!(
                qualifier = %activity.id.unique_qualifier,
                name = %event.name,
                "admin event is missing its target parameter"
            );
        }
    }

    changes
}

fn push(changes: &mut Vec<PendingChange>, event: &ActivityEvent, rt: ResourceType, param: &str) {
    if let Some(email) = event.param(param) {
        changes.push(PendingChange::new(rt, email));
    }
}

/// Returns true for Google's own apps, whose client id is the app name.
pub fn is_private_app(client_id: &str, app_name: &str) -> bool {
    client_id == app_name && PRIVATE_APP_CLIENT_ID.is_match(client_id)
}

/// Interprets a token audit activity into usage events.
///
/// Errors if an `authorize` event lacks `client_id` or `app_name`, or the
/// activity has no actor; the caller skips the whole activity.
pub fn interpret_usage(activity: &Activity) -> SyncResult<Vec<NormalizedEvent>> {
    let occurred_at = activity.occurred_at();
    let qualifier = &activity.id.unique_qualifier;
    let mut events = Vec::new();

    for event in &activity.events {
        if event.name != AUTHORIZE_EVENT {
            continue;
        }

        let client_id = event.param("client_id").ok_or_else(|| {
            SyncError::invalid_argument(format!("activity {qualifier}: missing client_id"))
        })?;
        let app_name = event.param("app_name").ok_or_else(|| {
            SyncError::invalid_argument(format!("activity {qualifier}: missing app_name"))
        })?;

        if is_private_app(client_id, app_name) {
            debug!(%qualifier, %client_id, "suppressing first-party app authorization");
            continue;
        }

        let actor = actor_of(activity)?;
        events.push(NormalizedEvent::usage(
            qualifier.clone(),
            occurred_at,
            ResourceRef::new(ResourceType::App, client_id).with_display_name(app_name),
            actor,
        ));
    }

    Ok(events)
}

fn actor_of(activity: &Activity) -> SyncResult<ActorRef> {
    match (&activity.actor.profile_id, &activity.actor.email) {
        (Some(id), Some(email)) if !id.is_empty() => Ok(ActorRef {
            id: id.clone(),
            email: email.clone(),
        }),
        _ => Err(SyncError::invalid_argument(format!(
            "activity {}: missing actor",
            activity.id.unique_qualifier
        ))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Other(IgnoredAny),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Signed(n) => n.to_string(),
            StringOrNumber::Unsigned(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
            StringOrNumber::Other(_) => String::new(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?
        .map(String::from)
        .unwrap_or_default())
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wsconnect_core::EventKind;

    fn activity(value: serde_json::Value) -> Activity {
        serde_json::from_value(value).unwrap()
    }

    fn admin_event(name: &str, category: &str, params: &[(&str, &str)]) -> Activity {
        let parameters: Vec<_> = params
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect();
        activity(json!({
            "id": {"time": "2024-03-15T10:00:00.000Z", "uniqueQualifier": "-42", "applicationName": "admin"},
            "actor": {"email": "admin@example.com", "profileId": "100"},
            "events": [{"type": category, "name": name, "parameters": parameters}]
        }))
    }

    #[test]
    fn parses_reports_api_record() {
        let record = activity(json!({
            "kind": "admin#reports#activity",
            "id": {
                "time": "2024-03-15T10:00:00.000Z",
                "uniqueQualifier": 7319876543210_i64,
                "applicationName": "token",
                "customerId": "C0123abcd"
            },
            "actor": {"email": "jane@example.com", "profileId": "1122"},
            "events": [{
                "type": "auth",
                "name": "authorize",
                "parameters": [
                    {"name": "client_id", "value": "abc.apps.googleusercontent.com"},
                    {"name": "scope", "multiValue": ["openid", "email"]},
                    {"name": "app_age", "intValue": "12"}
                ]
            }]
        }));

        assert_eq!(record.id.unique_qualifier, "7319876543210");
        assert_eq!(record.id.customer_id.as_deref(), Some("C0123abcd"));
        assert_eq!(record.events[0].category, "auth");
        assert_eq!(record.events[0].parameters[1].multi_value.len(), 2);
        assert_eq!(record.events[0].param("app_age"), Some("12"));
        assert_eq!(record.occurred_at().timestamp(), 1_710_496_800);
    }

    #[test]
    fn tolerates_nulls_and_numbers_in_string_fields() {
        let page: ActivityPage = serde_json::from_value(json!({
            "items": [
                {
                    "id": {"time": null, "uniqueQualifier": "1", "applicationName": null},
                    "events": [{"type": null, "name": "CREATE_USER", "parameters": [
                        {"name": null, "value": "x"},
                        {"name": "USER_EMAIL", "value": "jane@example.com", "multiValue": null}
                    ]}]
                },
                {"id": {"time": 1_710_496_800_i64, "uniqueQualifier": "2"}, "events": null},
                {"id": {"time": 1.5, "uniqueQualifier": "3"}, "actor": null}
            ]
        }))
        .unwrap();

        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].id.time, "");
        assert_eq!(page.items[0].occurred_at(), DateTime::UNIX_EPOCH);
        assert_eq!(page.items[0].events[0].param("USER_EMAIL"), Some("jane@example.com"));
        assert_eq!(page.items[1].occurred_at().timestamp(), 1_710_496_800);
        assert!(page.items[1].events.is_empty());
        assert_eq!(page.items[2].occurred_at(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn group_rename_is_one_change() {
        let changes = interpret_admin(&admin_event(
            "CHANGE_GROUP_NAME",
            "GROUP_SETTINGS",
            &[("GROUP_EMAIL", "eng@example.com"), ("NEW_VALUE", "Engineering")],
        ));
        assert_eq!(
            changes,
            vec![PendingChange::new(ResourceType::Group, "eng@example.com")]
        );
    }

    #[test]
    fn group_email_change_emits_old_and_new() {
        let changes = interpret_admin(&admin_event(
            "CHANGE_GROUP_EMAIL",
            "GROUP_SETTINGS",
            &[
                ("GROUP_EMAIL", "old@example.com"),
                ("NEW_VALUE", "new@example.com"),
            ],
        ));
        assert_eq!(
            changes,
            vec![
                PendingChange::new(ResourceType::Group, "old@example.com"),
                PendingChange::new(ResourceType::Group, "new@example.com"),
            ]
        );
    }

    #[test]
    fn membership_change_touches_group_and_user() {
        let changes = interpret_admin(&admin_event(
            "ADD_GROUP_MEMBER",
            "GROUP_SETTINGS",
            &[
                ("GROUP_EMAIL", "eng@example.com"),
                ("USER_EMAIL", "jane@example.com"),
            ],
        ));
        assert_eq!(
            changes,
            vec![
                PendingChange::new(ResourceType::Group, "eng@example.com"),
                PendingChange::new(ResourceType::User, "jane@example.com"),
            ]
        );
    }

    #[test]
    fn user_events_in_allow_list() {
        for name in ["CREATE_USER", "SUSPEND_USER", "GRANT_ADMIN_PRIVILEGE"] {
            let changes = interpret_admin(&admin_event(
                name,
                "USER_SETTINGS",
                &[("USER_EMAIL", "jane@example.com")],
            ));
            assert_eq!(changes.len(), 1, "{name}");
            assert_eq!(changes[0].resource_type, ResourceType::User);
        }

        let renamed = interpret_admin(&admin_event(
            "RENAME_USER",
            "USER_SETTINGS",
            &[
                ("USER_EMAIL", "jane@example.com"),
                ("NEW_VALUE", "jane.doe@example.com"),
            ],
        ));
        assert_eq!(renamed.len(), 2);
    }

    #[test]
    fn deletions_and_unknown_events_are_skipped() {
        assert!(
            interpret_admin(&admin_event(
                "DELETE_GROUP",
                "GROUP_SETTINGS",
                &[("GROUP_EMAIL", "gone@example.com")],
            ))
            .is_empty()
        );
        assert!(
            interpret_admin(&admin_event(
                "CHANGE_APPLICATION_SETTING",
                "APPLICATION_SETTINGS",
                &[("APPLICATION_NAME", "Drive")],
            ))
            .is_empty()
        );
        // Known pair in the wrong category.
        assert!(
            interpret_admin(&admin_event(
                "CREATE_USER",
                "GROUP_SETTINGS",
                &[("USER_EMAIL", "jane@example.com")],
            ))
            .is_empty()
        );
    }

    #[test]
    fn missing_parameter_yields_nothing() {
        assert!(interpret_admin(&admin_event("CREATE_GROUP", "GROUP_SETTINGS", &[])).is_empty());
        assert!(
            interpret_admin(&admin_event(
                "CREATE_GROUP",
                "GROUP_SETTINGS",
                &[("GROUP_EMAIL", "  ")]
            ))
            .is_empty()
        );
    }

    fn authorize(client_id: Option<&str>, app_name: Option<&str>) -> Activity {
        let mut parameters = Vec::new();
        if let Some(client_id) = client_id {
            parameters.push(json!({"name": "client_id", "value": client_id}));
        }
        if let Some(app_name) = app_name {
            parameters.push(json!({"name": "app_name", "value": app_name}));
        }
        activity(json!({
            "id": {"time": "2024-03-15T11:00:00Z", "uniqueQualifier": "99", "applicationName": "token"},
            "actor": {"email": "jane@example.com", "profileId": "1122"},
            "events": [
                {"type": "auth", "name": "authorize", "parameters": parameters},
                {"type": "auth", "name": "revoke", "parameters": []}
            ]
        }))
    }

    #[test]
    fn usage_event_for_third_party_app() {
        let events =
            interpret_usage(&authorize(Some("abc.apps.googleusercontent.com"), Some("Slack")))
                .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "99");
        match &events[0].kind {
            EventKind::Usage {
                target_resource,
                actor_resource,
            } => {
                assert_eq!(target_resource.resource_type, ResourceType::App);
                assert_eq!(target_resource.id, "abc.apps.googleusercontent.com");
                assert_eq!(target_resource.display_name.as_deref(), Some("Slack"));
                assert_eq!(actor_resource.id, "1122");
                assert_eq!(actor_resource.email, "jane@example.com");
            }
            other => panic!("expected usage event, got {other:?}"),
        }
    }

    #[test]
    fn private_first_party_app_is_suppressed() {
        assert!(is_private_app("123456789", "123456789"));
        assert!(is_private_app(
            "123456789.apps.googleusercontent.com",
            "123456789.apps.googleusercontent.com"
        ));
        assert!(!is_private_app("123456789", "Google Chrome"));
        assert!(!is_private_app("abc.apps.googleusercontent.com", "abc.apps.googleusercontent.com"));

        let events = interpret_usage(&authorize(Some("123456789"), Some("123456789"))).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn usage_without_required_parameters_is_rejected() {
        let err = interpret_usage(&authorize(None, Some("Slack"))).unwrap_err();
        assert!(err.message().contains("client_id"));

        let err = interpret_usage(&authorize(Some("abc"), None)).unwrap_err();
        assert!(err.message().contains("app_name"));
    }

    #[test]
    fn query_pairs_for_fresh_window_and_continuation() {
        let start = "2024-03-15T10:00:00Z".parse().unwrap();
        let mut query = ActivityQuery::new(TOKEN_APPLICATION, 50);
        query.customer_id = Some("C0123abcd".to_string());
        query.start_time = Some(start);
        query.event_name = Some(AUTHORIZE_EVENT.to_string());

        assert_eq!(
            query.query_pairs(),
            vec![
                ("customerId", "C0123abcd".to_string()),
                ("startTime", "2024-03-15T10:00:00.000Z".to_string()),
                ("maxResults", "50".to_string()),
                ("eventName", "authorize".to_string()),
            ]
        );

        let mut next = ActivityQuery::new(ADMIN_APPLICATION, 50);
        next.page_token = Some("tok".to_string());
        assert_eq!(
            next.query_pairs(),
            vec![
                ("pageToken", "tok".to_string()),
                ("maxResults", "50".to_string())
            ]
        );
    }
}
