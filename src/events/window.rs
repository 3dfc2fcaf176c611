use std::collections::BTreeMap;

use super::Event;

/// Sparse, append-only window of indexed events for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventWindow {
    inner: BTreeMap<u64, Event>,
}

impl EventWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `event` under its own index.
    ///
    /// An index that is already assigned keeps the event stored first and
    /// `false` is returned.
    pub fn put(&mut self, event: Event) -> bool {
        match self.inner.entry(event.index) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(event);
                true
            }
        }
    }

    pub fn get(&self, index: u64) -> Option<&Event> {
        self.inner.get(&index)
    }

    /// Present events with an index in `[from, to]`, in index order.
    pub fn range(&self, from: u64, to: u64) -> Vec<&Event> {
        if from > to {
            return Vec::new();
        }
        self.inner.range(from..=to).map(|(_, event)| event).collect()
    }

    /// Whether every index in `[from, to]` is present.
    pub fn is_complete(&self, from: u64, to: u64) -> bool {
        if from > to {
            return true;
        }
        match (to - from).checked_add(1) {
            Some(expected) => self.inner.range(from..=to).count() as u64 == expected,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    fn event(index: u64) -> Event {
        Event {
            index,
            description: format!("event {index}"),
        }
    }

    fn window_of(indices: &[u8]) -> EventWindow {
        let mut window = EventWindow::new();
        for index in indices {
            window.put(event(*index as u64));
        }
        window
    }

    #[test]
    fn test_range_skips_missing_indices() {
        let window = window_of(&[0, 1, 3, 4]);
        let indices: Vec<u64> = window.range(0, 4).iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 3, 4]);
        assert!(!window.is_complete(0, 4));
        assert!(window.is_complete(3, 4));
    }

    #[test]
    fn test_range_on_empty_window() {
        let window = EventWindow::new();
        assert!(window.range(0, 10).is_empty());
        assert!(!window.is_complete(0, 0));
        assert!(window.get(0).is_none());
    }

    #[test]
    fn test_put_does_not_overwrite() {
        let mut window = EventWindow::new();
        assert!(window.put(event(2)));
        assert!(!window.put(Event {
            index: 2,
            description: "other".to_string(),
        }));
        assert_eq!(
            window.get(2).map(|e| e.description.as_str()),
            Some("event 2")
        );
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_is_complete_on_full_u64_range() {
        let window = window_of(&[0, 1]);
        assert!(!window.is_complete(0, u64::MAX));
    }

    #[quickcheck]
    fn range_stays_within_bounds(indices: Vec<u8>, from: u8, to: u8) -> bool {
        let window = window_of(&indices);
        window.range(from as u64, to as u64).iter().all(|e| {
            e.index >= from as u64 && e.index <= to as u64 && window.get(e.index).is_some()
        })
    }

    #[quickcheck]
    fn complete_iff_range_is_full(indices: Vec<u8>, from: u8, to: u8) -> TestResult {
        if from > to {
            return TestResult::discard();
        }
        let window = window_of(&indices);
        let returned = window.range(from as u64, to as u64).len() as u64;
        let expected = (to - from) as u64 + 1;
        TestResult::from_bool(window.is_complete(from as u64, to as u64) == (returned == expected))
    }

    #[quickcheck]
    fn range_is_ordered(indices: Vec<u8>) -> bool {
        let window = window_of(&indices);
        let range = window.range(0, u8::MAX as u64);
        range.windows(2).all(|pair| pair[0].index < pair[1].index)
    }
}
