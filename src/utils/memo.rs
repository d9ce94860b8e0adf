/// Memoized value tagged with the dependency key it was computed from.
///
/// Invalidate-on-write: the value is recomputed whenever the key handed to
/// [`Memo::get_or_update`] differs from the stored one.
#[derive(Debug, Clone)]
pub struct Memo<K, V> {
    entry: Option<(K, V)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Memo { entry: None }
    }
}

impl<K, V> Memo<K, V>
where
    K: PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, computing it with `f` when the key changed
    pub fn get_or_update(&mut self, key: K, f: impl FnOnce() -> V) -> &V {
        if self.entry.as_ref().is_some_and(|(k, _)| *k != key) {
            self.entry = None;
        }
        let (_, v) = self.entry.get_or_insert_with(|| (key, f()));
        v
    }

    /// Current value if it was computed for `key`
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entry.as_ref().filter(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
