//! Online-user tracking from `onlineUsers` snapshots.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

/// Record types that carry a user id and an online flag to project onto.
pub trait UserBearing {
    fn user_id(&self) -> &str;
    fn set_online(&mut self, online: bool);
}

/// Set of user ids currently connected, replaced wholesale on each snapshot.
///
/// Clones share state, so the channel subscription and any consumer can hold
/// the same tracker.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    online: Arc<Mutex<HashSet<String>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked set with a fresh snapshot. A user absent from the
    /// snapshot is offline even if previously present; an empty snapshot
    /// means nobody is online.
    pub fn replace(&self, snapshot: Vec<String>) {
        let mut online = self.online.lock().expect("presence lock poisoned");
        *online = snapshot.into_iter().collect();
    }

    /// Whether a user id is in the current snapshot.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.online
            .lock()
            .expect("presence lock poisoned")
            .contains(user_id)
    }

    /// Number of users in the current snapshot.
    pub fn online_count(&self) -> usize {
        self.online.lock().expect("presence lock poisoned").len()
    }

    /// Re-derive the online flag for every record in `users`.
    pub fn flag_online<T: UserBearing>(&self, users: &mut [T]) {
        let online = self.online.lock().expect("presence lock poisoned");
        for user in users {
            let flag = online.contains(user.user_id());
            user.set_online(flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        id: String,
        online: bool,
    }

    impl UserBearing for Row {
        fn user_id(&self) -> &str {
            &self.id
        }
        fn set_online(&mut self, online: bool) {
            self.online = online;
        }
    }

    #[test]
    fn snapshot_replaces_not_merges() {
        let tracker = PresenceTracker::new();
        tracker.replace(vec!["u1".into(), "u2".into()]);
        assert!(tracker.is_online("u1"));
        assert!(tracker.is_online("u2"));

        tracker.replace(vec!["u2".into(), "u3".into()]);
        assert!(!tracker.is_online("u1"));
        assert!(tracker.is_online("u3"));
    }

    #[test]
    fn empty_snapshot_marks_everyone_offline() {
        let tracker = PresenceTracker::new();
        tracker.replace(vec!["u1".into(), "u2".into()]);
        tracker.replace(vec![]);
        assert!(!tracker.is_online("u1"));
        assert!(!tracker.is_online("u2"));
        assert_eq!(tracker.online_count(), 0);
    }

    #[test]
    fn projects_flags_onto_records() {
        let tracker = PresenceTracker::new();
        tracker.replace(vec!["u2".into()]);
        let mut rows = vec![
            Row {
                id: "u1".into(),
                online: true,
            },
            Row {
                id: "u2".into(),
                online: false,
            },
        ];
        tracker.flag_online(&mut rows);
        assert!(!rows[0].online);
        assert!(rows[1].online);
    }

    #[test]
    fn clones_share_state() {
        let tracker = PresenceTracker::new();
        let view = tracker.clone();
        tracker.replace(vec!["u1".into()]);
        assert!(view.is_online("u1"));
    }
}
