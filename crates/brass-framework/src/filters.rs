//! Ready-made filters.

use std::collections::HashSet;
use std::ops::Deref;

use brass_core::payload::{GroupMessage, MessageEvent, PrivateMessage};

use crate::handler::{Filter, filter};

/// Group messages from the given groups only.
pub fn only_groups(groups: impl IntoIterator<Item = i64>) -> Filter<GroupMessage> {
    let groups: HashSet<i64> = groups.into_iter().collect();
    filter(move |msg: &GroupMessage| groups.contains(&msg.group_id))
}

/// Group messages sent by the given users only.
pub fn only_group_users(users: impl IntoIterator<Item = i64>) -> Filter<GroupMessage> {
    let users: HashSet<i64> = users.into_iter().collect();
    filter(move |msg: &GroupMessage| users.contains(&msg.user_id))
}

/// Private messages from the given users only.
pub fn only_users(users: impl IntoIterator<Item = i64>) -> Filter<PrivateMessage> {
    let users: HashSet<i64> = users.into_iter().collect();
    filter(move |msg: &PrivateMessage| users.contains(&msg.user_id))
}

/// Group messages mentioning at least one of `user_ids` (`"all"` included).
pub fn only_at_users<S: Into<String>>(
    user_ids: impl IntoIterator<Item = S>,
) -> Filter<GroupMessage> {
    let user_ids: HashSet<String> = user_ids.into_iter().map(Into::into).collect();
    filter(move |msg: &GroupMessage| msg.ats().iter().any(|at| user_ids.contains(&at.qq)))
}

/// Messages whose first text segment is `<prefix><command>`, compared
/// case-insensitively.
pub fn on_command<T, S>(prefix: &str, commands: impl IntoIterator<Item = S>) -> Filter<T>
where
    T: Deref<Target = MessageEvent> + 'static,
    S: Into<String>,
{
    let prefix = prefix.to_string();
    let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
    filter(move |msg: &T| {
        let Some(text) = msg.first_text() else {
            return false;
        };
        text.command(&prefix)
            .is_some_and(|cmd| commands.iter().any(|c| c.eq_ignore_ascii_case(cmd)))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn group_msg(group_id: i64, user_id: i64, segments: serde_json::Value) -> GroupMessage {
        serde_json::from_value(json!({
            "time": 1, "self_id": 1, "message_type": "group",
            "message_id": 1, "group_id": group_id, "user_id": user_id,
            "message": segments
        }))
        .unwrap()
    }

    #[test]
    fn allow_lists() {
        let msg = group_msg(10, 20, json!([]));
        assert!(only_groups([10, 11])(&msg));
        assert!(!only_groups([11])(&msg));
        assert!(only_group_users([20])(&msg));
        assert!(!only_group_users([21])(&msg));
    }

    #[test]
    fn mentions() {
        let msg = group_msg(1, 2, json!([{"type": "at", "data": {"qq": "42"}}]));
        assert!(only_at_users(["42"])(&msg));
        assert!(!only_at_users(["43"])(&msg));
        assert!(!only_at_users(["42"])(&group_msg(1, 2, json!([]))));
    }

    #[test]
    fn commands() {
        let msg = group_msg(1, 2, json!([{"type": "text", "data": {"text": " /Echo hi"}}]));
        assert!(on_command::<GroupMessage, _>("/", ["echo", "say"])(&msg));
        assert!(!on_command::<GroupMessage, _>("/", ["help"])(&msg));
        assert!(!on_command::<GroupMessage, _>("!", ["echo"])(&msg));
    }
}
