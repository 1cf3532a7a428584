use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::{Clock, FloorId, Step, SystemClock};

use crate::comment::{CommentRecord, NewComment};
use crate::seeds::{CommentSeeds, builtin_seeds};
use crate::thread::{Reply, ThreadBook, ThreadKey};

/// Author of the opening entry seeded into every thread.
pub const SITE_ASSISTANT: &str = "Site Assistant";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentError {
    Parse(String),
    InvalidSeed(String),
    EmptyText,
    InvalidPosition,
}

impl std::fmt::Display for CommentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommentError::Parse(msg) => write!(f, "comment data unreadable: {msg}"),
            CommentError::InvalidSeed(msg) => write!(f, "invalid comment seed: {msg}"),
            CommentError::EmptyText => write!(f, "comment text is empty"),
            CommentError::InvalidPosition => write!(f, "comment position is not finite"),
        }
    }
}

impl std::error::Error for CommentError {}

type StepKey = (FloorId, Step);

/// Comments keyed by `(floor, step)` plus their reply threads.
///
/// Built-in comments are fixed at construction. User comments live for the
/// session and are the only ones that can be removed.
pub struct CommentStore {
    builtin: BTreeMap<StepKey, Vec<CommentRecord>>,
    user: BTreeMap<StepKey, Vec<CommentRecord>>,
    threads: ThreadBook,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CommentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentStore")
            .field("builtin", &self.builtin.len())
            .field("user", &self.user.len())
            .field("threads", &self.threads.len())
            .finish()
    }
}

impl Default for CommentStore {
    fn default() -> Self {
        Self::new(builtin_seeds(), Arc::new(SystemClock))
    }
}

impl CommentStore {
    pub fn new(seeds: CommentSeeds, clock: Arc<dyn Clock>) -> Self {
        let mut builtin = BTreeMap::new();
        for (floor, steps) in seeds {
            for (step, records) in steps {
                if records.is_empty() {
                    continue;
                }
                builtin.insert((floor.clone(), step), records);
            }
        }
        Self {
            builtin,
            user: BTreeMap::new(),
            threads: ThreadBook::new(),
            clock,
        }
    }

    /// Built-in comments first, then user comments, each in insertion order.
    pub fn step_comments(&self, floor: &FloorId, step: Step) -> Vec<CommentRecord> {
        let key = (floor.clone(), step);
        let builtin = self.builtin.get(&key).into_iter().flatten();
        let user = self.user.get(&key).into_iter().flatten();
        builtin.chain(user).cloned().collect()
    }

    pub fn builtin_comments(&self, floor: &FloorId) -> Vec<(Step, &CommentRecord)> {
        self.builtin
            .iter()
            .filter(|((f, _), _)| f == floor)
            .flat_map(|((_, step), records)| records.iter().map(move |r| (*step, r)))
            .collect()
    }

    pub fn user_comment_count(&self) -> usize {
        self.user.values().map(Vec::len).sum()
    }

    pub fn add_user_comment(
        &mut self,
        floor: &FloorId,
        step: Step,
        comment: NewComment,
    ) -> Result<CommentRecord, CommentError> {
        if comment.title.trim().is_empty() {
            return Err(CommentError::EmptyText);
        }
        if !comment.pixel.is_finite() {
            return Err(CommentError::InvalidPosition);
        }
        let record = CommentRecord {
            x: comment.pixel.x,
            y: comment.pixel.y,
            title: comment.title,
            description: comment.description,
            risk: comment.risk,
            id: Some(format!("user-{}", uuid::Uuid::new_v4())),
            is_user: true,
        };
        tracing::debug!(floor = %floor, step, id = ?record.id, "user comment added");
        self.user
            .entry((floor.clone(), step))
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    /// Removes the user comment with `id`. Built-ins are never removed.
    pub fn remove_user_comment(&mut self, floor: &FloorId, step: Step, id: &str) -> bool {
        let key = (floor.clone(), step);
        let Some(records) = self.user.get_mut(&key) else {
            return false;
        };
        let before = records.len();
        records.retain(|r| !(r.is_user && r.id.as_deref() == Some(id)));
        let removed = records.len() != before;
        if records.is_empty() {
            self.user.remove(&key);
        }
        if removed {
            tracing::debug!(floor = %floor, step, id, "user comment removed");
        }
        removed
    }

    /// Returns the comment's thread key, seeding the thread with an opening
    /// entry on first use.
    pub fn open_thread(&mut self, floor: &FloorId, step: Step, comment: &CommentRecord) -> ThreadKey {
        let key = ThreadKey::derive(floor, step, &comment.title);
        if !self.threads.contains(&key) {
            let opening = Reply {
                author: SITE_ASSISTANT.to_string(),
                timestamp: self.clock.now().label(),
                text: opening_text(comment),
            };
            self.threads.seed(key.clone(), opening);
        }
        key
    }

    pub fn append_reply(&mut self, key: &ThreadKey, author: &str, text: &str) -> bool {
        let at = self.clock.now();
        self.threads.append(key, author, text, at)
    }

    pub fn thread(&self, key: &ThreadKey) -> Option<&[Reply]> {
        self.threads.get(key)
    }
}

fn opening_text(comment: &CommentRecord) -> String {
    format!(
        "{} flagged: {}. {}",
        comment.risk.display().badge,
        comment.title,
        comment.description
    )
}
