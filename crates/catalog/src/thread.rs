use std::collections::BTreeMap;

use foundation::{FloorId, Step, Timestamp};
use serde::Serialize;

/// Stable identifier of a comment's reply thread.
///
/// Derived from `(floor, step, normalized title)`, so the same comment maps
/// to the same thread across re-renders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ThreadKey(String);

impl ThreadKey {
    pub fn derive(floor: &FloorId, step: Step, title: &str) -> Self {
        let canonical = format!("{}\u{1f}{}\u{1f}{}", floor, step, normalize_title(title));
        ThreadKey(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases and collapses runs of whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub author: String,
    pub timestamp: String,
    pub text: String,
}

/// All reply threads of a session, in arrival order per thread.
#[derive(Debug, Default)]
pub struct ThreadBook {
    threads: BTreeMap<ThreadKey, Vec<Reply>>,
}

impl ThreadBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn contains(&self, key: &ThreadKey) -> bool {
        self.threads.contains_key(key)
    }

    pub fn get(&self, key: &ThreadKey) -> Option<&[Reply]> {
        self.threads.get(key).map(|t| t.as_slice())
    }

    /// Creates the thread with `opening` as its first entry if it does not
    /// exist yet. Returns `true` if it was created.
    pub fn seed(&mut self, key: ThreadKey, opening: Reply) -> bool {
        if self.threads.contains_key(&key) {
            return false;
        }
        self.threads.insert(key, vec![opening]);
        true
    }

    /// Appends a reply. Blank text and unknown threads are ignored.
    pub fn append(&mut self, key: &ThreadKey, author: &str, text: &str, at: Timestamp) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(thread) = self.threads.get_mut(key) else {
            return false;
        };
        thread.push(Reply {
            author: author.to_string(),
            timestamp: at.label(),
            text: text.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{Reply, ThreadBook, ThreadKey, normalize_title};
    use chrono::{FixedOffset, TimeZone};
    use foundation::{FloorId, Timestamp};
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32) -> Timestamp {
        let offset = FixedOffset::east_opt(-5 * 3600).expect("offset");
        Timestamp(offset.with_ymd_and_hms(2024, 5, 1, h, m, 0).single().expect("time"))
    }

    #[test]
    fn key_ignores_case_and_spacing() {
        let floor = FloorId::new("3rd");
        let a = ThreadKey::derive(&floor, 1, "Debris Uncleared");
        let b = ThreadKey::derive(&floor, 1, "  debris   UNCLEARED ");
        assert_eq!(a, b);
        assert_ne!(a, ThreadKey::derive(&floor, 2, "Debris Uncleared"));
        assert_ne!(a, ThreadKey::derive(&FloorId::new("roof"), 1, "Debris Uncleared"));
        assert_eq!(normalize_title(" A  b\tC "), "a b c");
    }

    #[test]
    fn seed_once_then_append_in_order() {
        let mut book = ThreadBook::new();
        let key = ThreadKey::derive(&FloorId::new("3rd"), 1, "x");
        let opening = Reply {
            author: "bot".to_string(),
            timestamp: "09:00".to_string(),
            text: "first".to_string(),
        };
        assert!(book.seed(key.clone(), opening.clone()));
        assert!(!book.seed(key.clone(), opening));

        assert!(book.append(&key, "me", "  second ", at(1, 0)));
        assert!(!book.append(&key, "me", "   ", at(1, 0)));

        let texts: Vec<_> = book
            .get(&key)
            .expect("thread")
            .iter()
            .map(|r| r.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(book.get(&key).expect("thread")[1].timestamp, "01:00");
    }

    #[test]
    fn append_to_unknown_thread_is_ignored() {
        let mut book = ThreadBook::new();
        let key = ThreadKey::derive(&FloorId::new("3rd"), 1, "x");
        assert!(!book.append(&key, "me", "hello", at(0, 0)));
        assert!(book.is_empty());
    }
}
