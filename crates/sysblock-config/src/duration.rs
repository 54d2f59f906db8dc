//! Duration grammar for rule limits
//!
//! A bare integer is minutes. Anything else is scanned left to right:
//! digits accumulate, `h` flushes them as hours, `m` flushes them as
//! minutes, other characters are ignored, and a trailing run of digits is
//! added as minutes. `"1h30m"`, `"1h 30"` and `"90"` are all 90.

/// Parse a limit into minutes. Unparseable input yields 0.
pub fn parse_duration_minutes(input: &str) -> u32 {
    if let Ok(minutes) = input.parse::<u32>() {
        return minutes;
    }

    let mut total: u32 = 0;
    let mut digits = String::new();

    for ch in input.chars().flat_map(char::to_lowercase) {
        match ch {
            '0'..='9' => digits.push(ch),
            'h' => {
                total = total.saturating_add(flush(&mut digits).saturating_mul(60));
            }
            'm' => {
                total = total.saturating_add(flush(&mut digits));
            }
            _ => {}
        }
    }

    total.saturating_add(flush(&mut digits))
}

fn flush(digits: &mut String) -> u32 {
    let value = digits.parse::<u32>().unwrap_or(0);
    digits.clear();
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_integer_is_minutes() {
        assert_eq!(parse_duration_minutes("90"), 90);
        assert_eq!(parse_duration_minutes("0"), 0);
    }

    #[test]
    fn suffixes() {
        assert_eq!(parse_duration_minutes("1h"), 60);
        assert_eq!(parse_duration_minutes("2h"), 120);
        assert_eq!(parse_duration_minutes("45m"), 45);
        assert_eq!(parse_duration_minutes("1h30m"), 90);
        assert_eq!(parse_duration_minutes("1H 30M"), 90);
    }

    #[test]
    fn trailing_digits_count_as_minutes() {
        assert_eq!(parse_duration_minutes("1h30"), 90);
        assert_eq!(parse_duration_minutes("1h 5"), 65);
    }

    #[test]
    fn garbage_is_zero() {
        assert_eq!(parse_duration_minutes(""), 0);
        assert_eq!(parse_duration_minutes("soon"), 0);
        assert_eq!(parse_duration_minutes("h"), 0);
    }

    #[test]
    fn sign_is_ignored_by_scan() {
        // a leading '-' is not part of the grammar; only the digits count
        assert_eq!(parse_duration_minutes("-5"), 5);
    }
}
