//! Parsers for the loosely formatted numbers found in wiki table cells.

const PLACEHOLDERS: [&str; 3] = ["", "—", "-"];

fn is_placeholder(value: &str) -> bool {
    PLACEHOLDERS.contains(&value.trim())
}

/// `"20%"` → `0.20`. Placeholders and unparseable text yield `0.0`.
pub fn parse_percentage(value: &str) -> f64 {
    if is_placeholder(value) {
        return 0.0;
    }
    let cleaned = value.replace('%', "");
    parse_float_prefix(cleaned.trim())
        .map(|number| number / 100.0)
        .unwrap_or(0.0)
}

/// `"+10"` → `10`, `"-5"` → `-5`. Every character other than digits, `.` and `-` is
/// dropped before parsing; placeholders and garbage yield `0.0`.
pub fn parse_modifier(value: &str) -> f64 {
    if is_placeholder(value) {
        return 0.0;
    }
    let cleaned = value
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == '-')
        .collect::<String>();
    parse_float_prefix(&cleaned).unwrap_or(0.0)
}

/// Leading integer of a cell after removing parenthesised annotations: `"45 (x8)"` → `45`.
pub fn parse_leading_int(value: &str) -> i64 {
    let stripped = strip_parentheticals(value);
    let trimmed = stripped.trim();
    let end = trimmed
        .char_indices()
        .find(|(index, ch)| !(ch.is_ascii_digit() || (*index == 0 && (*ch == '-' || *ch == '+'))))
        .map(|(index, _)| index)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<i64>().unwrap_or(0)
}

pub fn parse_grouped_int(value: &str) -> Option<i64> {
    let cleaned = value.trim().replace(',', "");
    if cleaned.is_empty() || !cleaned.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

pub fn strip_parentheticals(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut depth = 0usize;
    for ch in value.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => output.push(ch),
            _ => {}
        }
    }
    output
}

/// Longest prefix that parses as a float, mirroring how lenient number parsing treats
/// trailing junk ("12.5abc" → 12.5).
fn parse_float_prefix(value: &str) -> Option<f64> {
    value
        .char_indices()
        .map(|(index, ch)| index + ch.len_utf8())
        .filter_map(|end| value[..end].parse::<f64>().ok())
        .filter(|number| number.is_finite())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn percentage_strings() {
        assert!(close(parse_percentage("20%"), 0.20));
        assert!(close(parse_percentage(" 7.5 % "), 0.075));
        assert_eq!(parse_percentage("—"), 0.0);
        assert_eq!(parse_percentage("-"), 0.0);
        assert_eq!(parse_percentage(""), 0.0);
        assert_eq!(parse_percentage("n/a"), 0.0);
    }

    #[test]
    fn modifier_strings() {
        assert_eq!(parse_modifier("+10"), 10.0);
        assert_eq!(parse_modifier("-5"), -5.0);
        assert_eq!(parse_modifier("+7%"), 7.0);
        assert_eq!(parse_modifier(""), 0.0);
        assert_eq!(parse_modifier("—"), 0.0);
        assert_eq!(parse_modifier("garbage"), 0.0);
    }

    #[test]
    fn leading_int_ignores_annotations() {
        assert_eq!(parse_leading_int("45"), 45);
        assert_eq!(parse_leading_int("45 (x8)"), 45);
        assert_eq!(parse_leading_int("(x8) 240"), 240);
        assert_eq!(parse_leading_int("880 m/s"), 880);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("—"), 0);
    }

    #[test]
    fn grouped_ints() {
        assert_eq!(parse_grouped_int("25,000"), Some(25_000));
        assert_eq!(parse_grouped_int("5"), Some(5));
        assert_eq!(parse_grouped_int("5a"), None);
        assert_eq!(parse_grouped_int(""), None);
    }
}
