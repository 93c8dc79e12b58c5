//! Utilities.

/// Returns ceiling log2.
pub const fn clog2(value: usize) -> usize {
    if value == 0 {
        0
    } else {
        (::std::mem::size_of::<usize>() * 8) - (value - 1).leading_zeros() as usize
    }
}

/// Returns `true` if `value` is a power of two.
pub const fn is_pow2(value: usize) -> bool { value != 0 && (value & (value - 1)) == 0 }

/// Returns `k` such that `base^k == value`, if there is one.
///
/// ### Example
/// ```
/// # use bbq::utils::exact_log;
/// assert_eq!(exact_log(4, 16), Some(2));
/// assert_eq!(exact_log(4, 8), None);
/// ```
pub fn exact_log(base: usize, value: usize) -> Option<usize> {
    if base < 2 || value == 0 {
        return None;
    }
    let mut acc = 1usize;
    let mut k = 0;
    while acc < value {
        acc = acc.checked_mul(base)?;
        k += 1;
    }
    if acc == value {
        Some(k)
    } else {
        None
    }
}

/// Combines all elements into one String, separated by `sep`. Returns `None` if all elements are `None`.
pub fn join_options<I>(sep: &str, iterable: I) -> Option<String>
where I: IntoIterator<Item = Option<String>> {
    let iterable = iterable.into_iter().flatten().collect::<Vec<_>>();
    if iterable.is_empty() {
        None
    } else {
        Some(iterable.join(sep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs() {
        assert_eq!(clog2(1), 0);
        assert_eq!(clog2(5), 3);
        assert_eq!(clog2(64), 6);
        assert!(is_pow2(8));
        assert!(!is_pow2(12));
        assert!(!is_pow2(0));
        assert_eq!(exact_log(4, 1), Some(0));
        assert_eq!(exact_log(4, 64), Some(3));
        assert_eq!(exact_log(2, 6), None);
        assert_eq!(exact_log(usize::MAX, usize::MAX - 1), None);
    }

    #[test]
    fn join() {
        assert_eq!(join_options(", ", vec![None, Some("a".to_string()), None, Some("b".to_string())]), Some("a, b".to_string()));
        assert_eq!(join_options(", ", vec![None, None]), None);
    }
}
