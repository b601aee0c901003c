//! In-memory notification inbox fed by the channel.

use std::sync::{Arc, Mutex};

use crate::model::Notification;

#[derive(Default)]
struct InboxInner {
    items: Vec<Notification>,
    unread: usize,
}

/// Accumulates `notification` events as they arrive. Clones share the same
/// inbox, so the channel subscription and the UI read one list.
#[derive(Clone, Default)]
pub struct NotificationInbox {
    inner: Arc<Mutex<InboxInner>>,
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notification, newest first. It counts as unread until the
    /// next `mark_all_read`.
    pub fn push(&self, notification: Notification) {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        inner.items.insert(0, notification);
        inner.unread += 1;
    }

    /// Snapshot of all notifications, newest first.
    pub fn all(&self) -> Vec<Notification> {
        self.inner.lock().expect("inbox lock poisoned").items.clone()
    }

    /// Notifications received since the last `mark_all_read`.
    pub fn unread_count(&self) -> usize {
        self.inner.lock().expect("inbox lock poisoned").unread
    }

    pub fn mark_all_read(&self) {
        self.inner.lock().expect("inbox lock poisoned").unread = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationSender;
    use chrono::{TimeZone, Utc};

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.into(),
            from_user: NotificationSender {
                username: "bo".into(),
                avatar: "b.png".into(),
            },
            message: format!("liked your post ({id})"),
            post_id: Some("p1".into()),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn newest_first_and_unread_counted() {
        let inbox = NotificationInbox::new();
        inbox.push(notification("n1"));
        inbox.push(notification("n2"));

        let all = inbox.all();
        assert_eq!(all[0].id, "n2");
        assert_eq!(all[1].id, "n1");
        assert_eq!(inbox.unread_count(), 2);
    }

    #[test]
    fn mark_all_read_resets_and_new_arrivals_count_again() {
        let inbox = NotificationInbox::new();
        inbox.push(notification("n1"));
        inbox.mark_all_read();
        assert_eq!(inbox.unread_count(), 0);

        inbox.push(notification("n2"));
        assert_eq!(inbox.unread_count(), 1);
        assert_eq!(inbox.all().len(), 2);
    }

    #[test]
    fn clones_share_the_inbox() {
        let inbox = NotificationInbox::new();
        let view = inbox.clone();
        inbox.push(notification("n1"));
        assert_eq!(view.unread_count(), 1);
    }
}
