//! In-app notice board: short messages shown to a user when they sign in

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Notices kept per user before the oldest are dropped.
const NOTICES_PER_USER: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub username: String,
    pub message: String,
    pub posted_at: DateTime<Utc>,
}

/// Per-user notice lists, bounded and held in memory.
#[derive(Clone, Default)]
pub struct NoticeBoard {
    notices: Arc<RwLock<HashMap<String, VecDeque<Notice>>>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post(&self, username: &str, message: &str) -> Notice {
        let notice = Notice {
            username: username.to_string(),
            message: message.to_string(),
            posted_at: Utc::now(),
        };
        let mut guard = self.notices.write().await;
        let list = guard.entry(username.to_string()).or_default();
        if list.len() == NOTICES_PER_USER {
            list.pop_front();
        }
        list.push_back(notice.clone());
        notice
    }

    /// Notices for `username`, oldest first.
    pub async fn for_user(&self, username: &str) -> Vec<Notice> {
        self.notices
            .read()
            .await
            .get(username)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notices_are_per_user() {
        let board = NoticeBoard::new();
        board.post("alice", "dr-smith requested access").await;
        board.post("bob", "welcome").await;
        board.post("alice", "access granted to dr-smith").await;

        let alice = board.for_user("alice").await;
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].message, "dr-smith requested access");
        assert!(board.for_user("carol").await.is_empty());
    }

    #[tokio::test]
    async fn test_board_drops_oldest_when_full() {
        let board = NoticeBoard::new();
        for i in 0..NOTICES_PER_USER + 5 {
            board.post("alice", &format!("notice {}", i)).await;
        }
        let alice = board.for_user("alice").await;
        assert_eq!(alice.len(), NOTICES_PER_USER);
        assert_eq!(alice[0].message, "notice 5");
    }
}
