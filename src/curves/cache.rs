/// Single-entry cache keyed by a revision counter.
///
/// The owner bumps its revision on every change of the inputs; a value
/// computed for an older revision is recomputed on the next access.
#[derive(Debug, Clone)]
pub struct RevisionCache<T> {
    entry: Option<(u64, T)>,
}

impl<T> Default for RevisionCache<T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<T: Clone> RevisionCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, revision: u64) -> Option<T> {
        match &self.entry {
            Some((rev, value)) if *rev == revision => Some(value.clone()),
            _ => None,
        }
    }

    pub fn get_or_insert_with(&mut self, revision: u64, compute: impl FnOnce() -> T) -> T {
        if let Some(value) = self.get(revision) {
            return value;
        }
        let value = compute();
        self.entry = Some((revision, value.clone()));
        value
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Revision of the cached value, if any.
    pub fn revision(&self) -> Option<u64> {
        self.entry.as_ref().map(|(rev, _)| *rev)
    }
}
