//! Throttle for user-visible save-failure notices.
//!
//! Only manual saves ever produce a notice. At most one is shown per
//! interval, and showing a new one dismisses whatever is still on screen.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: Uuid,
    pub message: String,
}

/// Result of offering a notice to the throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeUpdate {
    /// Previously visible notice, now dismissed.
    pub dismissed: Option<Notice>,
    pub shown: Notice,
}

#[derive(Debug, Clone)]
pub struct NoticeThrottle {
    interval: Duration,
    last_shown: Option<Instant>,
    visible: Option<Notice>,
}

impl NoticeThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_shown: None,
            visible: None,
        }
    }

    /// Show `message` unless another notice was shown less than one interval ago.
    pub fn offer(&mut self, message: impl Into<String>, now: Instant) -> Option<NoticeUpdate> {
        if let Some(last) = self.last_shown {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        let shown = Notice {
            id: Uuid::now_v7(),
            message: message.into(),
        };
        self.last_shown = Some(now);
        let dismissed = self.visible.replace(shown.clone());
        Some(NoticeUpdate { dismissed, shown })
    }

    pub fn visible(&self) -> Option<&Notice> {
        self.visible.as_ref()
    }

    /// Dismiss the visible notice if its id matches.
    pub fn dismiss(&mut self, id: Uuid) -> bool {
        if self.visible.as_ref().is_some_and(|n| n.id == id) {
            self.visible = None;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.last_shown = None;
        self.visible = None;
    }
}
