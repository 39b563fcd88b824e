//! Field-level validators for the activation form.
//!
//! Every validator is a pure function returning an empty string for "valid"
//! and a human-readable message otherwise. Required-ness is a property of
//! the call site, not the validator: empty input is valid here wherever the
//! field is optional at the form level.

use std::sync::LazyLock;

use regex::Regex;

use crate::{MAX_AGE_YEARS, MAX_PHONE_DIGITS, MIN_PHONE_DIGITS};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is well-formed"));

/// Dialing prefixes for the countries selectable in the activation form.
/// The form defaults to South Africa; the list covers the markets the tags
/// ship to plus common travel destinations.
pub const COUNTRY_CALLING_CODES: &[(&str, &str)] = &[
    ("ZA", "27"),
    ("NA", "264"),
    ("BW", "267"),
    ("ZW", "263"),
    ("MZ", "258"),
    ("LS", "266"),
    ("SZ", "268"),
    ("KE", "254"),
    ("NG", "234"),
    ("GH", "233"),
    ("TZ", "255"),
    ("UG", "256"),
    ("ZM", "260"),
    ("MU", "230"),
    ("EG", "20"),
    ("GB", "44"),
    ("IE", "353"),
    ("DE", "49"),
    ("FR", "33"),
    ("NL", "31"),
    ("BE", "32"),
    ("ES", "34"),
    ("PT", "351"),
    ("IT", "39"),
    ("CH", "41"),
    ("US", "1"),
    ("CA", "1"),
    ("AU", "61"),
    ("NZ", "64"),
    ("IN", "91"),
    ("AE", "971"),
    ("BR", "55"),
];

#[must_use]
pub fn calling_code_for(country: &str) -> Option<&'static str> {
    let country = country.trim();
    COUNTRY_CALLING_CODES
        .iter()
        .find(|(alpha2, _)| alpha2.eq_ignore_ascii_case(country))
        .map(|(_, code)| *code)
}

#[must_use]
pub fn is_known_country(country: &str) -> bool {
    calling_code_for(country).is_some()
}

#[must_use]
pub fn digits_of(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Empty is valid; the primary contact email's required-ness is enforced at
/// the form level.
#[must_use]
pub fn validate_email(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    if EMAIL_RE.is_match(input) {
        String::new()
    } else {
        "Please enter a valid email address".to_string()
    }
}

/// Generic phone rule shared by every phone-bearing field: strip non-digits
/// and accept 7 to 15 digits. Empty is valid; the primary contact phone's
/// required-ness is enforced separately at the form level.
#[must_use]
pub fn validate_phone(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let digits = digits_of(input);
    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        String::new()
    } else {
        format!(
            "Phone number must have between {MIN_PHONE_DIGITS} and {MAX_PHONE_DIGITS} digits"
        )
    }
}

/// Age is optional; when present it must be a whole number of years in
/// 0..=50.
#[must_use]
pub fn validate_age(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    match input.trim().parse::<i64>() {
        Ok(age) if (0..=i64::from(MAX_AGE_YEARS)).contains(&age) => String::new(),
        _ => format!("Age must be a number between 0 and {MAX_AGE_YEARS}"),
    }
}

/// Submission-time composition of the international phone value. Live
/// validation works on the raw national number; only the final payload
/// carries the `+<calling code><national>` form. Leading trunk zeros are
/// dropped from the national part so the composed number is dialable.
#[must_use]
pub fn compose_phone(country: &str, national: &str) -> String {
    let code = calling_code_for(country)
        .unwrap_or_else(|| calling_code_for(crate::DEFAULT_COUNTRY).unwrap_or("27"));
    let digits = digits_of(national);
    let national = digits.trim_start_matches('0');
    format!("+{code}{national}")
}
