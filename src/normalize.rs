//! Turns heterogeneous spreadsheet cells into numbers, dates and folded text.
//!
//! Nothing here fails: unparseable input degrades to `0`, `None` or an empty
//! string so a single malformed row never aborts an aggregation pass.

use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::models::RawValue;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Same horizon as a JavaScript `Date`: ±100,000,000 days around 1970.
const MAX_SERIAL_MILLIS: f64 = 8.64e15;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

fn slash_date_regex() -> &'static Regex {
    static SLASH_DATE_RE: OnceLock<Regex> = OnceLock::new();
    SLASH_DATE_RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})(?:[\sT,].*)?$")
            .expect("slash date regex should compile")
    })
}

fn leading_float_regex() -> &'static Regex {
    static LEADING_FLOAT_RE: OnceLock<Regex> = OnceLock::new();
    LEADING_FLOAT_RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?")
            .expect("leading float regex should compile")
    })
}

fn html_entity_regex() -> &'static Regex {
    static HTML_ENTITY_RE: OnceLock<Regex> = OnceLock::new();
    HTML_ENTITY_RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);")
            .expect("html entity regex should compile")
    })
}

fn numeric_token_regex() -> &'static Regex {
    static NUMERIC_TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    NUMERIC_TOKEN_RE.get_or_init(|| Regex::new(r"\d+").expect("numeric token regex should compile"))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Longest numeric prefix of `text`, the way a lenient float reader does it.
fn leading_float(text: &str) -> Option<f64> {
    leading_float_regex()
        .find(text.trim_start())
        .and_then(|found| found.as_str().parse::<f64>().ok())
}

/// Monetary cell to a non-negative amount.
///
/// Text is stripped of `R`, `$` and whitespace. With both `,` and `.` present
/// the Brazilian convention applies (`.` thousands, `,` decimal); a lone `,`
/// is a decimal separator; anything else is read as-is. Sign is discarded.
pub fn parse_monetary_value(raw: Option<&RawValue>) -> f64 {
    let text = match raw {
        None | Some(RawValue::Null) | Some(RawValue::Date(_)) => return 0.0,
        Some(RawValue::Number(value)) => return finite_or_zero(value.abs()),
        Some(RawValue::Text(text)) => text,
    };

    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, 'R' | '$') && !c.is_whitespace())
        .collect();
    if stripped.is_empty() {
        return 0.0;
    }

    let normalized = if stripped.contains(',') && stripped.contains('.') {
        stripped.replace('.', "").replacen(',', ".", 1)
    } else if stripped.contains(',') {
        stripped.replacen(',', ".", 1)
    } else {
        stripped
    };

    leading_float(&normalized)
        .map(|value| finite_or_zero(value.abs()))
        .unwrap_or(0.0)
}

/// Lenient score reader: comma or dot decimal, sign kept, garbage is `0`.
pub fn parse_score(raw: Option<&RawValue>) -> f64 {
    match raw {
        None | Some(RawValue::Null) | Some(RawValue::Date(_)) => 0.0,
        Some(RawValue::Number(value)) => finite_or_zero(*value),
        Some(RawValue::Text(text)) => {
            let normalized = text.replacen(',', ".", 1);
            leading_float(normalized.trim())
                .map(finite_or_zero)
                .unwrap_or(0.0)
        }
    }
}

/// Any date-like cell to a wall-clock timestamp.
///
/// Accepts native dates, `dd/mm/yyyy` (time suffix ignored), `dd/mm/yy` with
/// month/day swap when only the first group can be a month, ISO-like strings
/// and Excel serial day numbers (epoch 1899-12-30).
pub fn parse_date(raw: Option<&RawValue>) -> Option<NaiveDateTime> {
    match raw? {
        RawValue::Null => None,
        RawValue::Date(value) => Some(*value),
        RawValue::Number(serial) => excel_serial_to_datetime(*serial),
        RawValue::Text(text) => parse_date_text(text),
    }
}

/// First parseable date among `values`, in order.
pub fn first_date<'a>(
    values: impl IntoIterator<Item = Option<&'a RawValue>>,
) -> Option<NaiveDateTime> {
    values.into_iter().find_map(parse_date)
}

pub fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = slash_date_regex().captures(trimmed) {
        return slash_date(&caps);
    }

    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(value.naive_local());
    }
    if let Ok(value) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(value.naive_local());
    }

    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
}

fn slash_date(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    let year_text = &caps[3];

    let (day, month, year) = if year_text.len() == 4 {
        (first, second, year_text.parse::<i32>().ok()?)
    } else {
        let short: i32 = year_text.parse().ok()?;
        let year = if short < 50 { 2000 + short } else { 1900 + short };
        if second > 12 && first <= 12 {
            (second, first, year)
        } else {
            (first, second, year)
        }
    };

    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.and_time(chrono::NaiveTime::MIN))
}

fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial == 0.0 {
        return None;
    }
    let millis = (serial * MILLIS_PER_DAY).round();
    if millis.abs() > MAX_SERIAL_MILLIS {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(chrono::NaiveTime::MIN);
    epoch.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Decodes the HTML entities spreadsheet exports tend to leak into cells.
pub fn decode_html(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    html_entity_regex().replace_all(text, |caps: &Captures<'_>| {
        let entity = &caps[1];
        decode_entity(entity).unwrap_or_else(|| caps[0].to_string())
    })
}

fn decode_entity(entity: &str) -> Option<String> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = match entity {
        "nbsp" => ' ',
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "aacute" => 'á',
        "agrave" => 'à',
        "acirc" => 'â',
        "atilde" => 'ã',
        "eacute" => 'é',
        "ecirc" => 'ê',
        "iacute" => 'í',
        "oacute" => 'ó',
        "ocirc" => 'ô',
        "otilde" => 'õ',
        "uacute" => 'ú',
        "ccedil" => 'ç',
        "Aacute" => 'Á',
        "Atilde" => 'Ã',
        "Eacute" => 'É',
        "Iacute" => 'Í',
        "Oacute" => 'Ó',
        "Uacute" => 'Ú',
        "Ccedil" => 'Ç',
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Lowercase, diacritic-free, trimmed form used for every keyword match.
pub fn fold(text: &str) -> String {
    decode_html(text)
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Folded text of a cell, empty for missing values.
pub fn normalize_text(raw: Option<&RawValue>) -> String {
    raw.and_then(RawValue::as_text)
        .map(|text| fold(&text))
        .unwrap_or_default()
}

/// HTML-decoded, trimmed text of a cell with its case and accents intact.
pub fn display_text(raw: Option<&RawValue>) -> String {
    raw.and_then(RawValue::as_text)
        .map(|text| decode_html(&text).trim().to_string())
        .unwrap_or_default()
}

/// Numeric tokens of a free-text property list, in order of appearance.
pub fn extract_ids(raw: Option<&RawValue>) -> Vec<String> {
    let Some(text) = raw.and_then(RawValue::as_text) else {
        return Vec::new();
    };
    let decoded = decode_html(&text);
    numeric_token_regex()
        .find_iter(&decoded)
        .map(|found| found.as_str().to_string())
        .collect()
}

/// Ordered keyword rule: fires when the text holds any of `any` and all of
/// `all`. The first firing rule of a table wins.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule<C> {
    pub any: &'static [&'static str],
    pub all: &'static [&'static str],
    pub category: C,
}

impl<C: Copy> KeywordRule<C> {
    pub const fn any(any: &'static [&'static str], category: C) -> Self {
        Self {
            any,
            all: &[],
            category,
        }
    }

    pub const fn with_all(
        any: &'static [&'static str],
        all: &'static [&'static str],
        category: C,
    ) -> Self {
        Self { any, all, category }
    }

    fn matches(&self, folded: &str) -> bool {
        self.any.iter().any(|keyword| folded.contains(keyword))
            && self.all.iter().all(|keyword| folded.contains(keyword))
    }
}

/// First matching category for already-folded text.
pub fn classify<C: Copy>(folded: &str, rules: &[KeywordRule<C>]) -> Option<C> {
    rules
        .iter()
        .find(|rule| rule.matches(folded))
        .map(|rule| rule.category)
}
