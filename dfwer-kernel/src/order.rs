//! Ordering permutations for numeric data.

/// Return the permutation that sorts `values` ascending, or descending when
/// `descending` is set.
///
/// The sort is stable: tied values keep their original relative order, so
/// ties always break towards the smaller index.
///
/// ```
/// use dfwer_kernel::order::order;
///
/// assert_eq!(order(&[0.3, 0.1, 0.2], false), vec![1, 2, 0]);
/// assert_eq!(order(&[0.3, 0.1, 0.2], true), vec![0, 2, 1]);
/// ```
pub fn order(values: &[f64], descending: bool) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    order_into(values, descending, &mut idx);
    idx
}

/// Like [`order`], but reuses the buffer `idx`.
///
/// Used inside tight loops that re-rank a column per grid point.
pub fn order_into(values: &[f64], descending: bool, idx: &mut Vec<usize>) {
    idx.clear();
    idx.extend(0..values.len());
    if descending {
        idx.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    } else {
        idx.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ascending() {
        assert_eq!(order(&[3.0, 1.0, 2.0], false), vec![1, 2, 0]);
    }

    #[test]
    fn order_descending() {
        assert_eq!(order(&[3.0, 1.0, 2.0], true), vec![0, 2, 1]);
    }

    #[test]
    fn ties_break_by_index() {
        let data = [0.5, 0.2, 0.5, 0.2];
        assert_eq!(order(&data, false), vec![1, 3, 0, 2]);
        assert_eq!(order(&data, true), vec![0, 2, 1, 3]);
    }

    #[test]
    fn order_empty() {
        assert!(order(&[], true).is_empty());
    }

    #[test]
    fn order_into_reuses_buffer() {
        let mut buf = vec![9, 9, 9, 9, 9];
        order_into(&[0.1, 0.4], true, &mut buf);
        assert_eq!(buf, vec![1, 0]);
    }
}
