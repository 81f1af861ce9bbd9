//! Maximal-run scanning over ordered sequences.

/// Partition `seq` into maximal runs and report the ones passing `filter`.
///
/// A run is a maximal span of adjacent elements where `are_equal` holds for
/// every neighboring pair and `filter` answers the same for every element.
/// `on_range` receives each passing run as a half-open `[start, end)` index
/// range, left to right.
///
/// Reported ranges never overlap, cannot be extended in either direction,
/// and together cover exactly the indices whose elements pass `filter`.
pub fn scan_ranges<T>(
  seq: &[T],
  mut are_equal: impl FnMut(&T, &T) -> bool,
  mut filter: impl FnMut(&T) -> bool,
  mut on_range: impl FnMut(usize, usize),
) {
  let Some(first) = seq.first() else {
    return;
  };

  let mut start = 0;
  let mut keep = filter(first);

  for (index, window) in seq.windows(2).enumerate() {
    let current = index + 1;
    let passes = filter(&window[1]);
    if are_equal(&window[0], &window[1]) && passes == keep {
      continue;
    }
    if keep {
      on_range(start, current);
    }
    start = current;
    keep = passes;
  }

  if keep {
    on_range(start, seq.len());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ranges_of(seq: &[u8], filter: impl FnMut(&u8) -> bool) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    scan_ranges(seq, |a, b| a == b, filter, |start, end| found.push((start, end)));
    found
  }

  #[test]
  fn empty_input_reports_nothing() {
    assert!(ranges_of(&[], |_| true).is_empty());
  }

  #[test]
  fn reports_maximal_runs() {
    let seq = [1, 1, 2, 2, 2, 1];
    assert_eq!(ranges_of(&seq, |_| true), [(0, 2), (2, 5), (5, 6)]);
  }

  #[test]
  fn filter_gates_which_runs_are_reported() {
    let seq = [2, 2, 3, 4, 4, 5];
    assert_eq!(ranges_of(&seq, |x| x % 2 == 0), [(0, 2), (3, 5)]);
  }

  #[test]
  fn a_filter_flip_starts_a_new_run() {
    // All elements compare equal under the predicate; only the filter
    // status changes, so the passing spans must still come out separately.
    let seq = [1, 2, 4, 6, 3, 8];
    let mut found = Vec::new();
    scan_ranges(&seq, |_, _| true, |x| x % 2 == 0, |start, end| {
      found.push((start, end));
    });
    assert_eq!(found, [(1, 4), (5, 6)]);
  }

  #[test]
  fn single_element_sequences() {
    assert_eq!(ranges_of(&[7], |_| true), [(0, 1)]);
    assert!(ranges_of(&[7], |_| false).is_empty());
  }

  quickcheck::quickcheck! {
    // Partition law: reported ranges are ascending, non-overlapping,
    // maximal, and cover exactly the filtered index set.
    fn partition_law(seq: Vec<u8>) -> bool {
      let equal = |a: &u8, b: &u8| a / 16 == b / 16;
      let passes = |x: &u8| x % 2 == 0;

      let mut found = Vec::new();
      scan_ranges(&seq, equal, passes, |start, end| found.push((start, end)));

      let mut covered = vec![false; seq.len()];
      let mut prev_end = 0;
      for &(start, end) in &found {
        if start >= end || start < prev_end || end > seq.len() {
          return false;
        }
        // Maximality: the run cannot be extended over its neighbors.
        if start > 0 && passes(&seq[start - 1]) && equal(&seq[start - 1], &seq[start]) {
          return false;
        }
        if end < seq.len() && passes(&seq[end]) && equal(&seq[end - 1], &seq[end]) {
          return false;
        }
        for flag in &mut covered[start..end] {
          *flag = true;
        }
        prev_end = end;
      }

      seq.iter().zip(&covered).all(|(x, flag)| *flag == passes(x))
    }
  }
}
