/// School-year window arithmetic for the paired-year labels PASI uses:
/// "2024/2025" or the short "24/25" form. The adjacent year keeps the
/// width of the input label. Anything else yields `None` and the caller
/// treats the adjacent year as unavailable.
pub fn next_school_year(year: &str) -> Option<String> {
    shift_school_year(year, 1)
}

pub fn previous_school_year(year: &str) -> Option<String> {
    shift_school_year(year, -1)
}

fn shift_school_year(year: &str, delta: i32) -> Option<String> {
    let (start_raw, end_raw) = year.trim().split_once('/')?;
    let width = start_raw.len();
    if width != end_raw.len() || (width != 2 && width != 4) {
        return None;
    }
    if !is_all_digits(start_raw) || !is_all_digits(end_raw) {
        return None;
    }

    let start: i32 = start_raw.parse().ok()?;
    let end: i32 = end_raw.parse().ok()?;
    if width == 2 {
        // Short labels work in full years internally, then truncate back.
        let start = (2000 + start + delta).rem_euclid(100);
        let end = (2000 + end + delta).rem_euclid(100);
        Some(format!("{start:02}/{end:02}"))
    } else {
        let start = start + delta;
        let end = end + delta;
        if start < 0 || end < 0 {
            return None;
        }
        Some(format!("{start:04}/{end:04}"))
    }
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_four_digit_labels() {
        assert_eq!(next_school_year("2024/2025").as_deref(), Some("2025/2026"));
        assert_eq!(
            previous_school_year("2024/2025").as_deref(),
            Some("2023/2024")
        );
    }

    #[test]
    fn shifts_two_digit_labels_keeping_width() {
        assert_eq!(next_school_year("24/25").as_deref(), Some("25/26"));
        assert_eq!(previous_school_year("24/25").as_deref(), Some("23/24"));
        assert_eq!(next_school_year("98/99").as_deref(), Some("99/00"));
    }

    #[test]
    fn round_trips_in_both_formats() {
        for label in ["2024/2025", "24/25", "99/00"] {
            let forward = next_school_year(label).expect("next");
            assert_eq!(previous_school_year(&forward).as_deref(), Some(label));
        }
    }

    #[test]
    fn rejects_unrecognized_formats() {
        for bad in ["2024-2025", "2024/25", "24/2025", "abc/def", "2024", ""] {
            assert_eq!(next_school_year(bad), None, "{bad}");
            assert_eq!(previous_school_year(bad), None, "{bad}");
        }
    }
}
