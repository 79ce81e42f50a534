//! Record identifier generation.
//!
//! During bulk load every record without a source id receives a temporary
//! id made of an improbable sentinel prefix and a counter. Once all ids are
//! known the generator switches to a short prefix that no existing id starts
//! with, so temporary ids can be rewritten into final ones without collisions.

use parking_lot::Mutex;

/// Sentinel prefix of temporary ids.
pub const TEMPORARY_ID_PREFIX: &str = "~";

/// Preferred character for the final id prefix.
pub const DEFAULT_FINAL_PREFIX: char = 'x';

#[derive(Debug)]
struct GeneratorState {
    prefix: String,
    counter: u64,
}

/// Issues unique record ids for one staging engine instance.
///
/// The generator is internally synchronized; ids are unique across all
/// threads sharing one instance.
#[derive(Debug)]
pub struct IdGenerator {
    temporary_prefix: String,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    /// Creates a generator issuing temporary ids with the given sentinel prefix.
    pub fn new(temporary_prefix: impl Into<String>) -> Self {
        let temporary_prefix = temporary_prefix.into();
        Self {
            state: Mutex::new(GeneratorState { prefix: temporary_prefix.clone(), counter: 0 }),
            temporary_prefix,
        }
    }

    /// Returns the next id.
    pub fn next(&self) -> String {
        let mut state = self.state.lock();
        state.counter += 1;
        format!("{}{}", state.prefix, state.counter)
    }

    /// Returns the prefix currently used by [`next`](Self::next).
    pub fn prefix(&self) -> String {
        self.state.lock().prefix.clone()
    }

    /// Returns true if `id` was issued as a temporary id.
    pub fn is_temporary(&self, id: &str) -> bool {
        id.starts_with(&self.temporary_prefix)
    }

    /// Switches to the shortest run of `preferred` that no existing id starts with.
    ///
    /// The counter restarts, since no id in use can share the new prefix.
    /// Returns the new prefix.
    pub fn rewrite_prefix<I, S>(&self, preferred: char, existing: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let longest_run = existing
            .into_iter()
            .map(|id| id.as_ref().chars().take_while(|c| *c == preferred).count())
            .max()
            .unwrap_or(0);
        let prefix: String = std::iter::repeat_n(preferred, longest_run + 1).collect();

        let mut state = self.state.lock();
        tracing::debug!(old = %state.prefix, new = %prefix, "Switching id prefix");
        state.prefix = prefix.clone();
        state.counter = 0;
        prefix
    }

    /// Advances the counter past every id in `existing` issued with the current prefix.
    ///
    /// Used when reopening a store so new ids continue after the persisted ones.
    pub fn resume_after<I, S>(&self, existing: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        let max = existing
            .into_iter()
            .filter_map(|id| {
                id.as_ref().strip_prefix(state.prefix.as_str()).and_then(|n| n.parse::<u64>().ok())
            })
            .max()
            .unwrap_or(0);
        state.counter = state.counter.max(max);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(TEMPORARY_ID_PREFIX)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{collections::HashSet, sync::Arc, thread};

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_temporary_ids_use_sentinel() {
        let id_gen = IdGenerator::default();
        assert_eq!(id_gen.next(), "~1");
        assert_eq!(id_gen.next(), "~2");
        assert!(id_gen.is_temporary("~2"));
        assert!(!id_gen.is_temporary("x2"));
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let id_gen = Arc::new(IdGenerator::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let id_gen = Arc::clone(&id_gen);
                thread::spawn(move || (0..1000).map(|_| id_gen.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id issued");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_rewrite_prefix_tries_longer_runs() {
        let id_gen = IdGenerator::default();
        let prefix = id_gen.rewrite_prefix('x', ["x1", "xx7", "abc", "~3"]);
        assert_eq!(prefix, "xxx");
        assert_eq!(id_gen.next(), "xxx1");
        assert!(!id_gen.is_temporary("xxx1"));
    }

    #[test]
    fn test_rewrite_prefix_without_conflicts() {
        let id_gen = IdGenerator::default();
        assert_eq!(id_gen.rewrite_prefix('x', ["a1", "b2"]), "x");
        assert_eq!(id_gen.rewrite_prefix('x', Vec::<String>::new()), "x");
    }

    #[test]
    fn test_resume_after_existing_ids() {
        let id_gen = IdGenerator::default();
        id_gen.resume_after(["~4", "~12", "x99", "~abc"]);
        assert_eq!(id_gen.next(), "~13");
    }

    proptest! {
        #[test]
        fn prop_rewritten_ids_never_collide(existing in proptest::collection::vec("[x~a-c0-9]{1,6}", 0..50)) {
            let id_gen = IdGenerator::default();
            id_gen.rewrite_prefix('x', &existing);
            let existing: HashSet<_> = existing.into_iter().collect();
            for _ in 0..100 {
                let id = id_gen.next();
                prop_assert!(!existing.contains(&id));
                prop_assert!(!existing.iter().any(|e| e.starts_with(&id_gen.prefix())));
            }
        }
    }
}
