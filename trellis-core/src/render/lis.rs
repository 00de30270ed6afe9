//! Longest increasing subsequence.
//!
//! The keyed diff uses this to find the largest set of matched nodes that
//! are already in relative order; only the nodes outside it move.
//!
//! Patience sorting with predecessor links: for each value, either extend
//! the longest run found so far or binary search the run whose tail it can
//! replace. O(n log n) time, O(n) space.

/// Indices into `seq` of one longest strictly increasing subsequence.
///
/// `None` entries (new nodes with no old counterpart) are skipped.
pub fn longest_increasing_subsequence(seq: &[Option<usize>]) -> Vec<usize> {
    let mut predecessors: Vec<Option<usize>> = vec![None; seq.len()];
    // (index into seq, value) of the smallest tail of each run length.
    let mut tails: Vec<(usize, usize)> = Vec::new();

    for (i, value) in seq.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };

        match tails.last() {
            None => {
                tails.push((i, value));
                continue;
            }
            Some(&(last, last_value)) if last_value < value => {
                predecessors[i] = Some(last);
                tails.push((i, value));
                continue;
            }
            Some(_) => {}
        }

        let pos = tails.partition_point(|&(_, v)| v < value);
        if value < tails[pos].1 {
            if pos > 0 {
                predecessors[i] = Some(tails[pos - 1].0);
            }
            tails[pos] = (i, value);
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().map(|&(i, _)| i);
    while let Some(i) = cursor {
        result.push(i);
        cursor = predecessors[i];
    }
    result.reverse();
    result
}
