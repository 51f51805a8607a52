//! Human-readable number formatting for the logged group tables.

use gov_indicators::round_to;

/// Inserts thousands separators, keeping any decimal part as printed by
/// the default float formatter. Non-finite input is shown as 0.
pub fn add_commas(number: f64) -> String {
    let number = if number.is_finite() { number } else { 0.0 };
    let s = number.to_string();
    let (int_part, dec_part) = match s.split_once('.') {
        Some((i, d)) => (i.to_string(), format!(".{}", d)),
        None => (s, String::new()),
    };
    let negative = int_part.starts_with('-');
    let digits: Vec<char> = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    let mut res = if negative {
        format!("-{}", grouped)
    } else {
        grouped
    };
    res.push_str(&dec_part);
    res
}

/// Abbreviates large magnitudes with a B/M/K suffix, one decimal place.
/// The K suffix is only applied when `thousand` is set.
pub fn format_number(number: f64, thousand: bool) -> String {
    let number = if number.is_finite() { number } else { 0.0 };
    if number > 999_999_999.0 {
        format!("{}B", add_commas(round_to(number / 1_000_000_000.0, 1)))
    } else if number > 999_999.0 {
        format!("{}M", add_commas(round_to(number / 1_000_000.0, 1)))
    } else if number > 999.0 && thousand {
        format!("{}K", add_commas(round_to(number / 1_000.0, 1)))
    } else {
        add_commas(number)
    }
}
