use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;
use tracing::debug;

static NON_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d.]").unwrap());

/// Trimmed text content of an element, or None when the element is absent
/// or its text is empty after trimming.
pub fn extract_text(element: Option<ElementRef>, context: &str) -> Option<String> {
    let Some(el) = element else {
        debug!("No element found for {}", context);
        return None;
    };
    let text: String = el.text().collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Strip everything that is not a digit or decimal point from an amount
/// string ("$1,234.56" → "1234.56"). Lossy: multiple decimal points are
/// passed through, not rejected.
pub fn clean_amount(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let cleaned = NON_AMOUNT_RE.replace_all(raw, "");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.into_owned())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn clean_amount_strips_currency_formatting() {
        assert_eq!(clean_amount(Some("$1,234.56")).as_deref(), Some("1234.56"));
        assert_eq!(clean_amount(Some("USD 500,000")).as_deref(), Some("500000"));
    }

    #[test]
    fn clean_amount_empty_and_absent() {
        assert_eq!(clean_amount(Some("")), None);
        assert_eq!(clean_amount(Some("N/A")), None);
        assert_eq!(clean_amount(None), None);
    }

    #[test]
    fn clean_amount_keeps_multiple_decimal_points() {
        // Permissive by design: no numeric validation.
        assert_eq!(clean_amount(Some("1.2.3")).as_deref(), Some("1.2.3"));
    }

    #[test]
    fn extract_text_trims() {
        let html = Html::parse_fragment("<span>  Department of Energy \n</span>");
        let sel = Selector::parse("span").unwrap();
        let el = html.select(&sel).next();
        assert_eq!(extract_text(el, "agency").as_deref(), Some("Department of Energy"));
    }

    #[test]
    fn extract_text_absent_element() {
        assert_eq!(extract_text(None, "missing"), None);
    }

    #[test]
    fn extract_text_whitespace_only_is_absent() {
        let html = Html::parse_fragment("<td>   \n\t </td>");
        let sel = Selector::parse("td").unwrap();
        let el = html.select(&sel).next();
        assert_eq!(extract_text(el, "blank"), None);
    }
}
