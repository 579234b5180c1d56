//! Keystroke normalizers for form fields. Each function is idempotent so the
//! frontend can reapply it after every key release without drift.

fn digits_only(text: &str, max: usize) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).take(max).collect()
}

/// YYYYMMDD digits into YYYY-MM-DD, truncated at 8 digits.
pub fn format_date(text: &str) -> String {
    let digits = digits_only(text, 8);
    match digits.len() {
        0..=4 => digits,
        5..=6 => format!("{}-{}", &digits[..4], &digits[4..]),
        _ => format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..]),
    }
}

pub fn format_contact(text: &str) -> String {
    digits_only(text, 10)
}

pub fn format_nic(text: &str) -> String {
    digits_only(text, 12)
}

pub fn format_year(text: &str) -> String {
    digits_only(text, 4)
}

/// Letters, spaces and periods only, runs of whitespace collapsed to one
/// space. Periods survive so initials like "A. B. Perera" stay typable; the
/// name validator is stricter on submit.
pub fn format_name(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace() || *c == '.')
        .collect();
    let mut out = String::with_capacity(kept.len());
    let mut prev_space = false;
    for c in kept.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

/// Digits plus at most one decimal point, truncated to 6 characters
/// ("100.00"), with any parsed value above 100 clamped to "100".
pub fn format_marks(text: &str) -> String {
    let mut out = String::new();
    let mut seen_dot = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            out.push(c);
        } else if c == '.' && !seen_dot {
            out.push(c);
            seen_dot = true;
        }
    }
    out.truncate(6);
    if let Ok(v) = out.parse::<f64>() {
        if v > 100.0 {
            return "100".to_string();
        }
    }
    out
}
