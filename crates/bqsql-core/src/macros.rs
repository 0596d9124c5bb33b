//! Query macros
//!
//! Expanded in query text before submission:
//!
//! - `$__timeGroup(column, interval)` buckets a timestamp column. Month
//!   intervals (`1M`) truncate to the first day of the month; every other
//!   interval (`30s`, `5m`, `1h`, `1d`, `1w`, `1y`, `1h30m`) becomes
//!   `TIMESTAMP_MILLIS(DIV(UNIX_MILLIS(column), ms) * ms)`.
//! - `$__column` and `$__table` are recognized but not supported.
//!
//! Any other `$__name` is left untouched.

use crate::error::{DriverError, Result};
use regex::Regex;

const MACROS: &[&str] = &["timeGroup", "column", "table"];

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Expand every supported macro in `sql`
pub fn interpolate(sql: &str) -> Result<String> {
    let pattern = Regex::new(r"\$__(\w+)").map_err(|e| DriverError::Macro(e.to_string()))?;

    let mut out = String::with_capacity(sql.len());
    let mut pos = 0;

    while let Some(caps) = pattern.captures_at(sql, pos) {
        let (Some(found), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        out.push_str(&sql[pos..found.start()]);
        pos = found.end();

        if !MACROS.contains(&name.as_str()) {
            out.push_str(found.as_str());
            continue;
        }

        let tail = &sql[pos..];
        let args = if tail.starts_with('(') {
            let close = matching_paren(tail).ok_or_else(|| {
                DriverError::Macro(format!("macro $__{} is missing its closing parenthesis", name.as_str()))
            })?;
            pos += close + 1;
            split_args(&tail[1..close])
        } else {
            Vec::new()
        };

        out.push_str(&expand(name.as_str(), &args)?);
    }

    out.push_str(&sql[pos..]);
    Ok(out)
}

fn expand(name: &str, args: &[&str]) -> Result<String> {
    match name {
        "timeGroup" => time_group(args),
        other => Err(DriverError::Macro(format!("$__{} macro is not supported", other))),
    }
}

fn time_group(args: &[&str]) -> Result<String> {
    if args.len() < 2 {
        return Err(DriverError::Macro(format!(
            "macro $__timeGroup needs time column and interval: expected 2 arguments, received {}",
            args.len()
        )));
    }

    let column = args[0];
    if column.is_empty() {
        return Err(DriverError::Macro(
            "the first parameter(time column) for $__timeGroup macro cannot be empty".to_string(),
        ));
    }
    if args[1].is_empty() {
        return Err(DriverError::Macro(
            "the second parameter(interval) for $__timeGroup macro cannot be empty".to_string(),
        ));
    }

    let interval = args[1].trim_matches(|c| c == '\'' || c == '"');

    if interval.ends_with('M') {
        return Ok(format!(
            "TIMESTAMP((PARSE_DATE(\"%Y-%m-%d\",CONCAT( CAST((EXTRACT(YEAR FROM {col})) AS STRING),'-',CAST((EXTRACT(MONTH FROM {col})) AS STRING),'-','01'))))",
            col = column
        ));
    }

    let millis = interval_millis(interval)
        .filter(|ms| *ms > 0)
        .ok_or_else(|| DriverError::Macro(format!("error parsing interval {}", interval)))?;

    Ok(format!(
        "TIMESTAMP_MILLIS(DIV(UNIX_MILLIS({}), {}) * {})",
        column, millis, millis
    ))
}

/// Milliseconds of an interval such as `5m`, `1h30m`, `1.5s`, `2d`, `1w`, `1y`
///
/// Days, weeks and years are fixed-length (24h, 7d, 365d).
pub fn interval_millis(text: &str) -> Option<i64> {
    if let Some(unit) = text.chars().last().filter(|c| matches!(c, 'd' | 'w' | 'y')) {
        let count = &text[..text.len() - 1];
        if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) {
            let days = match unit {
                'd' => 1,
                'w' => 7,
                _ => 365,
            };
            return count.parse::<i64>().ok()?.checked_mul(days * MILLIS_PER_DAY);
        }
    }

    duration_nanos(text).and_then(|nanos| i64::try_from(nanos / 1_000_000).ok())
}

/// Duration text in `<number><unit>...` form (`ns`, `us`, `ms`, `s`, `m`, `h`)
fn duration_nanos(text: &str) -> Option<i128> {
    let (negative, mut rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." {
            return None;
        }
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos: i128 = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return None,
        };
        rest = &rest[unit_len..];

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let whole: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut part = whole.checked_mul(unit_nanos)?;

        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(18)];
            let scale = 10i128.pow(digits.len() as u32);
            part = part.checked_add(digits.parse::<i128>().ok()? * unit_nanos / scale)?;
        }

        total = total.checked_add(part)?;
    }

    Some(if negative { -total } else { total })
}

/// Index of the `)` closing the `(` at the start of `text`
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (index, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(index);
                    }
                }
                _ => {}
            },
        }
    }

    None
}

/// Split on top-level commas, trimming each argument
fn split_args(text: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    args.push(text[start..index].trim());
                    start = index + 1;
                }
                _ => {}
            },
        }
    }

    args.push(text[start..].trim());
    args
}
