use std::sync::Mutex;

use super::emitter::EventEmitter;

/// `path` plus `?query` when the query is non-empty.
pub fn navigation_key(path: &str, query: &str) -> String {
    let query = query.trim_start_matches('?');
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}

/// Remembers the last emitted key and answers whether a navigation is new.
/// A fresh instance has no baseline, so a remount always emits once.
#[derive(Debug, Default)]
pub struct LastKeyFilter {
    last: Mutex<Option<String>>,
}

impl LastKeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` and returns true if it differs from the previous one.
    pub fn admit(&self, key: &str) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_deref() == Some(key) {
            return false;
        }
        *last = Some(key.to_string());
        true
    }
}

/// Caller-side page-view dedup in front of an `EventEmitter`.
pub struct NavigationObserver {
    emitter: EventEmitter,
    origin: String,
    filter: LastKeyFilter,
}

impl NavigationObserver {
    pub fn new(emitter: EventEmitter, origin: impl Into<String>) -> Self {
        Self {
            emitter,
            origin: origin.into().trim_end_matches('/').to_string(),
            filter: LastKeyFilter::new(),
        }
    }

    /// Returns the key if a page view was dispatched.
    pub fn on_navigate(&self, path: &str, query: &str) -> Option<String> {
        let key = navigation_key(path, query);
        if !self.filter.admit(&key) {
            return None;
        }
        self.emitter.set_location(format!("{}{}", self.origin, key));
        self.emitter.track_page_view(&key);
        Some(key)
    }
}
