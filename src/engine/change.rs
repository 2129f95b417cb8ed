//! Snapshot change detection

/// Remembers the last snapshot and reports whether a new one differs.
///
/// The stored snapshot is replaced on every call, so the result only tells
/// the caller whether an update is worth propagating.
#[derive(Debug, Clone)]
pub struct ChangeDetector<T> {
    previous: Option<T>,
}

impl<T> Default for ChangeDetector<T> {
    fn default() -> Self {
        Self { previous: None }
    }
}

impl<T: PartialEq> ChangeDetector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `candidate` and return `true` if it differs from the previous
    /// snapshot, or if there was none.
    pub fn ingest(&mut self, candidate: T) -> bool {
        let changed = self.previous.as_ref() != Some(&candidate);
        self.previous = Some(candidate);
        changed
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        mode: i32,
        current: f64,
    }

    #[test]
    fn test_first_ingest_is_a_change() {
        let mut detector = ChangeDetector::new();
        assert!(detector.previous().is_none());
        assert!(detector.ingest(Sample {
            mode: 1,
            current: 0.0
        }));
    }

    #[test]
    fn test_identical_snapshot_is_not_a_change() {
        let mut detector = ChangeDetector::new();
        let sample = Sample {
            mode: 3,
            current: 16.0,
        };
        detector.ingest(sample.clone());
        assert!(!detector.ingest(sample));
    }

    #[test]
    fn test_any_field_difference_is_a_change() {
        let mut detector = ChangeDetector::new();
        detector.ingest(Sample {
            mode: 3,
            current: 16.0,
        });
        assert!(detector.ingest(Sample {
            mode: 3,
            current: 16.01,
        }));
        assert!(detector.ingest(Sample {
            mode: 4,
            current: 16.01,
        }));
    }

    #[test]
    fn test_snapshot_is_replaced_even_without_change() {
        let mut detector = ChangeDetector::new();
        detector.ingest(Sample {
            mode: 3,
            current: 16.0,
        });
        detector.ingest(Sample {
            mode: 6,
            current: 0.0,
        });
        assert_eq!(
            detector.previous(),
            Some(&Sample {
                mode: 6,
                current: 0.0
            })
        );
    }
}
