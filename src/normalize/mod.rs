use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Whole-word roman numeral tokens I..X. Longest alternatives first so
/// "VIII" is not consumed as "V" + "III"; the `\b` anchors keep words
/// like "VIA" intact.
static ROMAN_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(X|IX|VIII|VII|VI|V|IV|III|II|I)\b").expect("roman token regex"));

/// First `H[:.]MM` / `HH[:.]MM` occurrence in a string. Minutes must be
/// exactly two digits, so "8.5" is not a time.
static TIME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[:.](\d{2})").expect("time token regex"));

/// Strip diacritics by NFD-decomposing and dropping combining marks.
pub fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn roman_tokens_to_arabic(s: &str) -> String {
    ROMAN_TOKEN
        .replace_all(s, |caps: &Captures| {
            match &caps[0] {
                "X" => "10",
                "IX" => "9",
                "VIII" => "8",
                "VII" => "7",
                "VI" => "6",
                "V" => "5",
                "IV" => "4",
                "III" => "3",
                "II" => "2",
                "I" => "1",
                other => other,
            }
            .to_string()
        })
        .into_owned()
}

/// Canonical comparison key for feed cells and query fields: diacritics
/// stripped, uppercase roman numerals I..X converted to digits,
/// uppercased, whitespace runs collapsed, ends trimmed.
///
/// Roman conversion runs before uppercasing, so a lowercase "iv" stays
/// a word rather than becoming "4".
pub fn normalize_text(s: &str) -> String {
    let decomposed = strip_diacritics(s);
    let arabic = roman_tokens_to_arabic(&decomposed);
    arabic
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize to "HH:MM" with a zero-padded hour. Accepts "8:00",
/// "08.00", "08:00 hs", etc. Returns "" when no time-shaped token is
/// present. Hour/minute ranges are not validated.
pub fn normalize_time(s: &str) -> String {
    match TIME_TOKEN.captures(s) {
        Some(caps) => format!("{:0>2}:{}", &caps[1], &caps[2]),
        None => String::new(),
    }
}

/// Minutes past midnight for a time-shaped string, via [`normalize_time`].
pub fn minutes_from_time(s: &str) -> Option<i64> {
    let normalized = normalize_time(s);
    let (hours, minutes) = normalized.split_once(':')?;
    Some(hours.parse::<i64>().ok()? * 60 + minutes.parse::<i64>().ok()?)
}

/// Canonical single-letter session-type code. "T" / "TEO*" is theory,
/// "P" / "PRA*" is practice; anything else falls back to its first
/// character so unusual feed codes still compare stably.
pub fn normalize_session_type(s: &str) -> String {
    let t = normalize_text(s);
    if t.is_empty() {
        return t;
    }
    if t == "T" || t.starts_with("TEO") {
        return "T".to_string();
    }
    if t == "P" || t.starts_with("PRA") {
        return "P".to_string();
    }
    t.chars().next().map(String::from).unwrap_or_default()
}
