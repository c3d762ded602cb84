//! Wrap-aware index spans

/// Inclusive index range `[start, end]` over a ring of `capacity` slots.
/// `end < start` means the span wraps past the last slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpan {
    pub start: usize,
    pub end: usize,
    pub capacity: usize,
}

impl SampleSpan {
    pub fn new(start: usize, end: usize, capacity: usize) -> Self {
        Self { start, end, capacity }
    }

    /// Number of slots covered
    pub fn len(&self) -> usize {
        if self.end >= self.start {
            self.end - self.start + 1
        } else {
            self.capacity - self.start + self.end + 1
        }
    }

    /// A span always covers at least one slot
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `index` falls inside the span
    pub fn contains(&self, index: usize) -> bool {
        if self.end >= self.start {
            self.start <= index && index <= self.end
        } else {
            index <= self.end || index >= self.start
        }
    }

    /// Slot indices oldest first
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        let (start, capacity) = (self.start, self.capacity);
        (0..self.len()).map(move |i| (start + i) % capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_span() {
        let span = SampleSpan::new(2, 5, 10);
        assert_eq!(span.len(), 4);
        assert!(span.contains(2) && span.contains(5));
        assert!(!span.contains(6));
        assert_eq!(span.indices().collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_wrapped_span() {
        let span = SampleSpan::new(8, 1, 10);
        assert_eq!(span.len(), 4);
        assert!(span.contains(9) && span.contains(0));
        assert!(!span.contains(5));
        assert_eq!(span.indices().collect::<Vec<_>>(), vec![8, 9, 0, 1]);
    }

    #[test]
    fn test_full_span() {
        let span = SampleSpan::new(3, 2, 10);
        assert_eq!(span.len(), 10);
        assert!((0..10).all(|i| span.contains(i)));
    }
}
