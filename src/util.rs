// Field coercion and display helpers.
//
// This module centralizes all the "dirty" currency/year/date handling from
// the source dossiers so the rest of the code can assume clean, typed
// values. Every coercion degrades to `None` or passes text through
// unchanged; nothing here fails.
use chrono::{Datelike, NaiveDate};
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Placeholder shown where a value is missing or unformattable.
pub const EM_DASH: &str = "\u{2014}";

/// `M/D/YY` or `M/D/YYYY` shaped token, possibly embedded in free text.
static DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{2,4})").unwrap());

/// First 4-digit token starting with 19 or 20.
static FULL_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:19|20)\d{2}").unwrap());

/// Spelled-out shapes tried as a last resort by [`extract_year`].
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%Y-%m-%d",
    "%m-%d-%Y",
    "%d %B %Y",
];

/// Parse a free-text currency string (`"$12,345.67"`, `"USD 1500"`) into
/// `f64`.
///
/// Strips every character except digits, `.` and `-` before parsing.
/// Returns `None` when nothing parseable remains, including leftovers with
/// stray dots or dashes.
pub fn parse_currency(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Finite-float-or-none coordinate parsing.
pub fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    let v = value?.trim();
    if v.is_empty() {
        return None;
    }
    v.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Widen a short numeric year: 2-digit values pivot on 70 (`"99"` -> 1999,
/// `"05"` -> 2005), 3-digit values are junk, anything longer is literal.
pub fn coerce_year(raw: &str) -> Option<i32> {
    let numeric: i32 = raw.parse().ok()?;
    match raw.len() {
        2 => Some(if numeric >= 70 {
            1900 + numeric
        } else {
            2000 + numeric
        }),
        3 => None,
        _ => Some(numeric),
    }
}

/// Calendar-validating date constructor; month 13 or Feb 30 come back
/// `None` rather than panicking or rolling over.
pub fn build_date(month: u32, day: u32, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Pull a calendar year out of free text.
///
/// An explicit `19xx`/`20xx` token wins over everything else. Failing that,
/// an `M/D/YY[YY]` token is coerced and calendar-validated; a token whose
/// year fails coercion aborts the search, while a calendar-invalid token
/// falls through to the spelled-out fallback formats.
pub fn extract_year(value: &str) -> Option<i32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(m) = FULL_YEAR.find(trimmed) {
        return m.as_str().parse().ok();
    }

    if let Some(caps) = DATE_TOKEN.captures(trimmed) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = coerce_year(&caps[3])?;
        if let Some(date) = build_date(month, day, year) {
            return Some(date.year());
        }
    }

    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .map(|date| date.year())
}

fn format_date_token(caps: &Captures) -> Option<String> {
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year = coerce_year(&caps[3])?;
    let date = build_date(month, day, year)?;
    Some(date.format("%b %-d, %Y").to_string())
}

/// Rewrite every valid `M/D/YY[YY]` token in `value` to `"Jan 5, 2020"`
/// form. A string may hold a range with two tokens or free text around a
/// token; invalid tokens and surrounding text pass through untouched.
/// Blank input renders as the em-dash placeholder.
pub fn format_date(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return EM_DASH.to_string();
    }
    DATE_TOKEN
        .replace_all(trimmed, |caps: &Captures| {
            format_date_token(caps).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Whole-dollar currency display with comma grouping; `None` renders as the
/// em-dash placeholder.
pub fn format_currency(value: Option<f64>) -> String {
    let Some(v) = value else {
        return EM_DASH.to_string();
    };
    if !v.is_finite() {
        return EM_DASH.to_string();
    }
    let whole = v.round() as i64;
    let formatted = whole.abs().to_formatted_string(&Locale::en);
    if whole < 0 {
        format!("-${}", formatted)
    } else {
        format!("${}", formatted)
    }
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimal places plus locale-aware thousands separators
    // (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative();
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper for counts in console messages (e.g., `9,855 rows`).
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_strips_symbols_and_separators() {
        assert_eq!(parse_currency("$12,345.67"), Some(12345.67));
        assert_eq!(parse_currency("USD 1500"), Some(1500.0));
        assert_eq!(parse_currency("(-250)"), Some(-250.0));
    }

    #[test]
    fn currency_rejects_empty_and_non_numeric() {
        assert_eq!(parse_currency(""), None);
        assert_eq!(parse_currency("N/A"), None);
        assert_eq!(parse_currency("pending"), None);
    }

    #[test]
    fn currency_rejects_stray_punctuation() {
        assert_eq!(parse_currency("1.2.3"), None);
        assert_eq!(parse_currency("--5"), None);
    }

    #[test]
    fn coordinate_requires_finite_float() {
        assert_eq!(parse_coordinate(Some("45.5")), Some(45.5));
        assert_eq!(parse_coordinate(Some("-93.27")), Some(-93.27));
        assert_eq!(parse_coordinate(Some("inf")), None);
        assert_eq!(parse_coordinate(Some("")), None);
        assert_eq!(parse_coordinate(None), None);
    }

    #[test]
    fn two_digit_years_pivot_on_seventy() {
        assert_eq!(coerce_year("05"), Some(2005));
        assert_eq!(coerce_year("69"), Some(2069));
        assert_eq!(coerce_year("70"), Some(1970));
        assert_eq!(coerce_year("99"), Some(1999));
    }

    #[test]
    fn three_digit_years_are_rejected() {
        assert_eq!(coerce_year("005"), None);
        assert_eq!(coerce_year("123"), None);
    }

    #[test]
    fn four_digit_years_are_literal() {
        assert_eq!(coerce_year("2024"), Some(2024));
        assert_eq!(coerce_year("1987"), Some(1987));
    }

    #[test]
    fn build_date_rejects_impossible_dates() {
        assert!(build_date(2, 30, 2020).is_none());
        assert!(build_date(13, 1, 2020).is_none());
        assert!(build_date(2, 29, 2020).is_some());
        assert!(build_date(2, 29, 2021).is_none());
    }

    #[test]
    fn format_date_rewrites_valid_tokens() {
        assert_eq!(format_date("3/15/2020"), "Mar 15, 2020");
        assert_eq!(format_date("1/5/98"), "Jan 5, 1998");
    }

    #[test]
    fn format_date_handles_ranges_and_surrounding_text() {
        assert_eq!(
            format_date("1/5/2020 - 2/10/2021"),
            "Jan 5, 2020 - Feb 10, 2021"
        );
        assert_eq!(format_date("letter of 6/1/19"), "letter of Jun 1, 2019");
    }

    #[test]
    fn format_date_leaves_invalid_tokens_unchanged() {
        assert_eq!(format_date("13/40/2020"), "13/40/2020");
        assert_eq!(format_date("2/30/2020 onward"), "2/30/2020 onward");
    }

    #[test]
    fn format_date_blank_is_placeholder() {
        assert_eq!(format_date(""), EM_DASH);
        assert_eq!(format_date("   "), EM_DASH);
    }

    #[test]
    fn extract_year_prefers_four_digit_tokens() {
        assert_eq!(extract_year("2021 grant cycle"), Some(2021));
        // The 4-digit token wins even with an embedded short date present.
        assert_eq!(extract_year("2021 cycle, letter 5/1/19"), Some(2021));
    }

    #[test]
    fn extract_year_falls_back_to_short_dates() {
        assert_eq!(extract_year("Letter dated 5/1/19"), Some(2019));
        assert_eq!(extract_year("3/15/05"), Some(2005));
    }

    #[test]
    fn extract_year_rejects_three_digit_token_years() {
        assert_eq!(extract_year("1/1/005"), None);
    }

    #[test]
    fn extract_year_handles_blank_and_junk() {
        assert_eq!(extract_year(""), None);
        assert_eq!(extract_year("n/a"), None);
        assert_eq!(extract_year("no date recorded"), None);
    }

    #[test]
    fn format_currency_rounds_and_groups() {
        assert_eq!(format_currency(Some(12345.67)), "$12,346");
        assert_eq!(format_currency(Some(-1200.0)), "-$1,200");
        assert_eq!(format_currency(Some(0.0)), "$0");
        assert_eq!(format_currency(None), EM_DASH);
    }

    #[test]
    fn format_number_keeps_decimals() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-42.5, 1), "-42.5");
        assert_eq!(format_number(7.0, 0), "7");
    }
}
