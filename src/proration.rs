//! Proration math for mid-period billing-cycle switches.
//!
//! Credit is linear in unused time: `(unused_days / total_days) × old price`,
//! computed in integer minor units. A positive value is a credit toward the
//! new cycle's first charge.

/// Credit in minor units for the unused remainder of the old period.
///
/// Returns 0 when the period has no length or is fully consumed; the full
/// old-period price when nothing was consumed.
pub fn switch_credit_minor(unused_days: i64, total_days: i64, old_price_minor: i64) -> i64 {
    if total_days <= 0 || unused_days <= 0 {
        return 0;
    }
    let unused = unused_days.min(total_days);
    // i128 intermediate keeps price × days from overflowing.
    ((unused as i128 * old_price_minor as i128) / total_days as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_at_period_boundary() {
        assert_eq!(switch_credit_minor(0, 31, 999), 0);
        assert_eq!(switch_credit_minor(-3, 31, 999), 0);
    }

    #[test]
    fn test_full_price_at_period_start() {
        assert_eq!(switch_credit_minor(31, 31, 999), 999);
        // Unused days beyond the period length are clamped.
        assert_eq!(switch_credit_minor(40, 31, 999), 999);
    }

    #[test]
    fn test_linear_in_unused_time() {
        // Half of an even period is exactly half the price.
        assert_eq!(switch_credit_minor(15, 30, 1000), 500);
        // Truncates toward zero, never over-credits.
        assert_eq!(switch_credit_minor(1, 3, 100), 33);
    }

    #[test]
    fn test_degenerate_period() {
        assert_eq!(switch_credit_minor(5, 0, 1000), 0);
    }

    #[test]
    fn test_credit_grows_toward_period_start() {
        let mut last = 0;
        for unused in 0..=30 {
            let credit = switch_credit_minor(unused, 30, 2999);
            assert!(credit >= last);
            last = credit;
        }
        assert_eq!(last, 2999);
    }
}
