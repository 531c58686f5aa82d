//! Wire-format tests for payloads the server sends.
//!
//! Each `#[case]` is isolated; no shared state.

use rstest::rstest;

use workplace_core::types::{Filter, Notification, NotificationId, Priority, Role, UserId};

#[rstest]
#[case("urgent", Priority::Urgent)]
#[case("high", Priority::High)]
#[case("medium", Priority::Medium)]
#[case("low", Priority::Low)]
fn priority_parses_from_payload(#[case] raw: &str, #[case] expected: Priority) {
    let json = format!(
        r#"{{"id":"n1","title":"t","message":"m","priority":"{raw}","createdAt":"2026-10-17T08:00:00Z"}}"#
    );
    let n: Notification = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(n.priority, expected);
}

#[rstest]
#[case("Staff", Role::Staff)]
#[case("Employee", Role::Staff)]
#[case("HR", Role::Hr)]
#[case("Human Resource", Role::Hr)]
#[case("Human Resources", Role::Hr)]
#[case("Human Resource Manager", Role::Hr)]
#[case("Admin", Role::Admin)]
#[case("ADMINISTRATOR", Role::Admin)]
fn role_spellings_canonicalize(#[case] raw: &str, #[case] expected: Role) {
    assert_eq!(raw.parse::<Role>(), Ok(expected), "[{raw}]");
}

#[rstest]
#[case(Filter::All, "all")]
#[case(Filter::Today, "today")]
#[case(Filter::Last3Days, "last3days")]
#[case(Filter::Last7Days, "last7days")]
fn filter_query_values(#[case] filter: Filter, #[case] query: &str) {
    assert_eq!(filter.as_str(), query);
    assert_eq!(query.parse::<Filter>(), Ok(filter));
}

#[test]
fn full_notification_payload() {
    let json = r#"{
        "_id": "6711",
        "title": "Leave approved",
        "message": "Your leave for Oct 20 was approved",
        "priority": "high",
        "isRead": true,
        "createdAt": "2026-10-17T08:30:00.000Z",
        "recipients": ["u-2", "u-1", "u-2"]
    }"#;
    let n: Notification = serde_json::from_str(json).expect("deserialize");
    assert_eq!(n.id, NotificationId::from("6711"));
    assert!(n.is_read);
    let recipients = n.recipients.as_ref().expect("recipients");
    assert_eq!(recipients.len(), 2, "recipients are a set");
    assert!(n.is_personal_to(&UserId::from("u-1")));

    let back = serde_json::to_value(&n).expect("serialize");
    assert_eq!(back["id"], "6711");
    assert_eq!(back["isRead"], true);
    assert_eq!(back["priority"], "high");
}

#[test]
fn notification_without_created_at_is_rejected() {
    let json = r#"{"id":"n1","title":"t","message":"m"}"#;
    assert!(serde_json::from_str::<Notification>(json).is_err());
}
