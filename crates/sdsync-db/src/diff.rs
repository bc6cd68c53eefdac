//! Lazy marker diff.
//!
//! Compares freshly fetched `(key, marker)` pairs against the stored state
//! and yields only keys whose marker is new or different. The stored map is
//! updated as a side effect of iteration, so once the iterator has been
//! fully consumed the map equals the state observed in this run.

use std::collections::HashMap;
use std::hash::Hash;

/// Iterator returned by [`diff`].
#[derive(Debug)]
#[must_use = "the stored state is only updated while the diff is iterated"]
pub struct Diff<'a, K, V, I> {
    old: &'a mut HashMap<K, V>,
    new: I,
}

/// Yields every key of `new` that is absent from `old` or carries a
/// different marker, overwriting `old[key]` before the key is yielded.
///
/// Duplicate keys in `new` are compared against the progressively updated
/// map, so a repeated `(key, marker)` pair is yielded at most once.
pub fn diff<K, V, I>(old: &mut HashMap<K, V>, new: I) -> Diff<'_, K, V, I::IntoIter>
where
    K: Eq + Hash + Clone,
    V: PartialEq,
    I: IntoIterator<Item = (K, V)>,
{
    Diff {
        old,
        new: new.into_iter(),
    }
}

impl<K, V, I> Iterator for Diff<'_, K, V, I>
where
    K: Eq + Hash + Clone,
    V: PartialEq,
    I: Iterator<Item = (K, V)>,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        for (key, marker) in self.new.by_ref() {
            if self.old.get(&key) == Some(&marker) {
                continue;
            }
            self.old.insert(key.clone(), marker);
            return Some(key);
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.new.size_hint().1)
    }
}
