use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

pub fn is_timestamp(value: &Value) -> bool {
    value
        .as_str()
        .map(|raw| DateTime::parse_from_rfc3339(raw).is_ok())
        .unwrap_or(false)
}

/// Item dates are plain calendar days, but full timestamps are tolerated.
pub fn is_item_date(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(raw).is_ok()
}

/// `HH:MM`, 24-hour clock.
pub fn is_clock_time(raw: &str) -> bool {
    let Some((hours, minutes)) = raw.split_once(':') else {
        return false;
    };
    if hours.len() != 2 || minutes.len() != 2 {
        return false;
    }
    match (hours.parse::<u8>(), minutes.parse::<u8>()) {
        (Ok(h), Ok(m)) => h < 24 && m < 60,
        _ => false,
    }
}

pub fn is_non_negative_integer(value: &Value) -> bool {
    value.as_u64().is_some_and(|n| n <= u32::MAX as u64)
}

pub fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clock_times() {
        assert!(is_clock_time("09:00"));
        assert!(is_clock_time("23:59"));
        assert!(!is_clock_time("24:00"));
        assert!(!is_clock_time("9:00"));
        assert!(!is_clock_time("09-00"));
        assert!(!is_clock_time("ab:cd"));
    }

    #[test]
    fn item_dates() {
        assert!(is_item_date("2026-02-28"));
        assert!(is_item_date("2026-02-28T08:00:00Z"));
        assert!(!is_item_date("2026-02-30"));
        assert!(!is_item_date("tomorrow"));
    }

    #[test]
    fn integers() {
        assert!(is_non_negative_integer(&json!(3)));
        assert!(!is_non_negative_integer(&json!(-1)));
        assert!(!is_non_negative_integer(&json!(1.5)));
        assert!(!is_non_negative_integer(&json!("2")));
    }
}
