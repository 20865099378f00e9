use rand::Rng;
use rand::distributions::Alphanumeric;
use std::ops::Range;
use tracing::info;

/// Split `len` items into at most `target` contiguous ranges of
/// `len / target` items; the remainder joins the last range. When there are
/// no more items than `target` the result is a single range.
pub fn partition(len: usize, target: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let target = target.max(1);
    if len <= target {
        return vec![0..len];
    }
    let size = len / target;
    (0..target)
        .map(|idx| {
            let start = idx * size;
            let end = if idx + 1 == target { len } else { start + size };
            start..end
        })
        .collect()
}

/// `(offset, slice)` pairs over `items`, partitioned as in [`partition`].
pub fn chunks<T>(items: &[T], target: usize) -> impl Iterator<Item = (usize, &[T])> {
    partition(items.len(), target)
        .into_iter()
        .map(move |range| (range.start, &items[range]))
}

/// Random alphanumeric serial number.
pub fn generate_serial_number(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Human-facing feedback during long operations. Has no effect on results.
pub trait Progress {
    fn advance(&mut self, done: usize, total: usize);

    fn finish(&mut self) {}
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&mut self, _done: usize, _total: usize) {}
}

/// Reports progress through the log.
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Progress for LogProgress {
    fn advance(&mut self, done: usize, total: usize) {
        info!("{} {}/{}", self.label, done, total);
    }

    fn finish(&mut self) {
        info!("{} done", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ninety_five_rows_in_ten_chunks() {
        let ranges = partition(95, 10);
        assert_eq!(ranges.len(), 10);
        assert!(ranges[..9].iter().all(|r| r.len() == 9));
        assert_eq!(ranges[9].len(), 14);
    }

    #[test]
    fn fewer_rows_than_chunks_is_one_chunk() {
        assert_eq!(partition(3, 10), vec![0..3]);
        assert!(partition(0, 10).is_empty());
    }

    #[test]
    fn chunks_carry_offsets() {
        let items: Vec<u32> = (0..7).collect();
        let pairs: Vec<(usize, &[u32])> = chunks(&items, 3).collect();
        assert_eq!(pairs[0], (0, &items[0..2]));
        assert_eq!(pairs[1], (2, &items[2..4]));
        assert_eq!(pairs[2], (4, &items[4..7]));
    }

    #[test]
    fn serial_numbers_are_alphanumeric() {
        let serial = generate_serial_number(8);
        assert_eq!(serial.len(), 8);
        assert!(serial.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    proptest! {
        #[test]
        fn chunks_reconstruct_input(items in proptest::collection::vec(any::<i32>(), 0..300), target in 1usize..40) {
            let rebuilt: Vec<i32> = chunks(&items, target)
                .flat_map(|(_, slice)| slice.iter().copied())
                .collect();
            prop_assert_eq!(rebuilt, items.clone());
            prop_assert!(partition(items.len(), target).len() <= target);
        }

        #[test]
        fn large_target_is_single_chunk(items in proptest::collection::vec(any::<i32>(), 1..50), extra in 0usize..20) {
            let target = items.len() + extra;
            let parts: Vec<(usize, &[i32])> = chunks(&items, target).collect();
            prop_assert_eq!(parts.len(), 1);
            prop_assert_eq!(parts[0].1, items.as_slice());
        }
    }
}
