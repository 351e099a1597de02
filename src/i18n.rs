/*
Simple i18n helper for notification texts.

This module provides:
- A tiny embedded translations store for EN/RU (compile-time embedded JSON).
- A simple `tr` function to lookup translations by key + optional params.
- A `t` convenience wrapper using the default language (DEFAULT_LANG).

Usage:
    use crate::i18n;
    let title = i18n::t("booking.confirmed.title");
    let msg = i18n::tr(Some("ru"), "booking.reminder.message", Some(&[("service", "Haircut"), ("provider", "Anna"), ("when", "2024-06-01 14:30 UTC")]));

Notes:
- Placeholders in translation strings use single-brace format: `{name}`.
- Default language is `en`. If a key is missing for the requested language,
  the fallback language will be used.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "en";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const EN_JSON: &str = r#"
{
  "booking.requested.title": "New booking request",
  "booking.requested.message": "{customer} requested {service} on {when}.",
  "booking.confirmed.title": "Booking confirmed",
  "booking.confirmed.message": "{provider} confirmed your {service} appointment on {when}.",
  "booking.cancelled.title": "Booking cancelled",
  "booking.cancelled.message": "{counterpart} cancelled the {service} appointment on {when}.",
  "booking.cancelled.reason": "Reason: {reason}",
  "booking.rescheduled.title": "Appointment rescheduled",
  "booking.rescheduled.message": "Your {service} appointment moved from {previous} to {when}.",
  "booking.reminder.title": "Upcoming appointment",
  "booking.reminder.message": "Reminder: {service} with {provider} on {when}.",
  "payment.received.title": "Payment received",
  "payment.received.message": "{customer} paid {amount} for {service}.",
  "error.unsupported_language": "Unsupported language: {lang}",
  "app.name": "Bookings"
}
"#;

const RU_JSON: &str = r#"
{
  "booking.requested.title": "Новая заявка на запись",
  "booking.requested.message": "{customer} хочет записаться на «{service}» {when}.",
  "booking.confirmed.title": "Запись подтверждена",
  "booking.confirmed.message": "{provider} подтвердил(а) вашу запись на «{service}» {when}.",
  "booking.cancelled.title": "Запись отменена",
  "booking.cancelled.message": "{counterpart} отменил(а) запись на «{service}» {when}.",
  "booking.cancelled.reason": "Причина: {reason}",
  "booking.rescheduled.title": "Запись перенесена",
  "booking.rescheduled.message": "Ваша запись на «{service}» перенесена с {previous} на {when}.",
  "booking.reminder.title": "Скоро запись",
  "booking.reminder.message": "Напоминание: «{service}» у {provider} {when}.",
  "payment.received.title": "Оплата получена",
  "payment.received.message": "{customer} оплатил(а) {amount} за «{service}».",
  "error.unsupported_language": "Неподдерживаемый язык: {lang}",
  "app.name": "Записи"
}
"#;

/// Initialize translations map (lazy).
fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    // Parse EN
    let en_map: HashMap<String, String> = serde_json::from_str(EN_JSON).unwrap_or_else(|e| {
        panic!("failed to parse EN_JSON in i18n module: {}", e);
    });
    out.insert("en".to_string(), en_map);

    // Parse RU
    let ru_map: HashMap<String, String> = serde_json::from_str(RU_JSON).unwrap_or_else(|e| {
        panic!("failed to parse RU_JSON in i18n module: {}", e);
    });
    out.insert("ru".to_string(), ru_map);

    out
}

/// Returns the global translations map (lang -> (key -> message)).
fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).to_lowercase()
}

/// Returns true if the given language code has a translation table.
pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Normalize placeholders in a message template.
/// Converts occurrences like `{{service}}` into `{service}`.
pub fn normalize_placeholders(msg: &str) -> String {
    let mut result = String::with_capacity(msg.len());
    let mut start = 0usize;

    while let Some(open_rel) = msg[start..].find("{{") {
        let open = start + open_rel;
        if let Some(close_rel) = msg[open + 2..].find("}}") {
            let close = open + 2 + close_rel;
            result.push_str(&msg[start..open]);
            let inner = &msg[open + 2..close];
            result.push('{');
            result.push_str(inner);
            result.push('}');
            start = close + 2;
        } else {
            // no closing braces found; append rest and return
            result.push_str(&msg[start..]);
            return result;
        }
    }

    result.push_str(&msg[start..]);
    result
}

/// Substitute `{name}` (or `{{name}}`) placeholders in `template`.
///
/// Single left-to-right pass: inserted values are never scanned again, and
/// unknown placeholders are kept as written.
pub fn render(template: &str, params: &[(&str, &str)]) -> String {
    let template = normalize_placeholders(template);
    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = &after[..close];
        match params.iter().find(|(k, _)| *k == name) {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Translate a key using an explicit language (or default if None).
///
/// - `lang`: optional language code (`"en"`, `"ru"`, ...). If None, DEFAULT_LANG is used.
/// - `key`: translation key (flat string, e.g. "booking.confirmed.title").
/// - `params`: optional slice of (name, value) for placeholder replacement.
///
/// Returns the translated and parameter-substituted string. If no translation is found,
/// returns the default language value or the key itself.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .cloned()
        // Fallback to default language
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)).cloned())
        // If still missing, return the key itself (useful in logs)
        .unwrap_or_else(|| key.to_string());

    match params {
        Some(params) => render(&val, params),
        None => val,
    }
}

/// Convenience wrapper: translate using default language (DEFAULT_LANG).
pub fn t(key: &str) -> String {
    tr(None, key, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tr_with_params() {
        let s = tr(
            Some("en"),
            "booking.confirmed.message",
            Some(&[
                ("provider", "Anna"),
                ("service", "Haircut"),
                ("when", "2024-06-01 14:30 UTC"),
            ]),
        );
        assert_eq!(
            s,
            "Anna confirmed your Haircut appointment on 2024-06-01 14:30 UTC."
        );
    }

    #[test]
    fn test_fallback_to_default() {
        // Unknown language falls back to default (en)
        let s = tr(Some("fr"), "booking.confirmed.title", None);
        assert_eq!(s, "Booking confirmed");
        let s = tr(Some("ru"), "booking.confirmed.title", None);
        assert_eq!(s, "Запись подтверждена");
    }

    #[test]
    fn missing_key_returns_key() {
        let k = "non.existent.key";
        assert_eq!(t(k), k.to_string());
    }

    #[test]
    fn test_is_supported_language() {
        assert!(is_supported_language("en"));
        assert!(is_supported_language("ru"));
        assert!(!is_supported_language("fr"));
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("en-US"), "en");
        assert_eq!(normalize_language("RU"), "ru");
    }

    #[test]
    fn normalize_placeholders_basic() {
        assert_eq!(
            normalize_placeholders("Hello {{customer}}!"),
            "Hello {customer}!"
        );
        assert_eq!(
            normalize_placeholders("{{service}} — {{when}}"),
            "{service} — {when}"
        );
        assert_eq!(
            normalize_placeholders("No placeholders here"),
            "No placeholders here"
        );
    }

    #[test]
    fn normalize_placeholders_edgecases() {
        // Triple braces collapse by one level
        assert_eq!(
            normalize_placeholders("Weird {{{service}}}"),
            "Weird {{service}}"
        );
        // Unmatched braces are preserved
        assert_eq!(
            normalize_placeholders("Broken {{service"),
            "Broken {{service"
        );
    }

    #[test]
    fn render_accepts_both_brace_styles() {
        let rendered = render(
            "{{service}} with {provider}",
            &[("service", "Massage"), ("provider", "Li")],
        );
        assert_eq!(rendered, "Massage with Li");
    }

    #[test]
    fn render_does_not_expand_inserted_values() {
        let rendered = render(
            "{customer} requested {service}",
            &[("customer", "{service}"), ("service", "Haircut")],
        );
        assert_eq!(rendered, "{service} requested Haircut");
    }

    #[test]
    fn render_keeps_unknown_and_unclosed_placeholders() {
        assert_eq!(
            render("{who} paid {amount", &[("amount", "$5")]),
            "{who} paid {amount"
        );
        assert_eq!(render("{a {b}", &[("b", "x")]), "{a x");
    }
}
