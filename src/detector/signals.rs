use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use similar::TextDiff;

/// Named database error signatures, checked in order, case-insensitively.
const ERROR_SIGNATURES: [(&str, &str); 9] = [
    ("SQL Error", r"SQL (error|syntax)"),
    (
        "MySQL Error",
        r"mysql_(fetch|query)|SQL syntax.*?MySQL|Warning.*?\Wmysqli?_",
    ),
    ("PostgreSQL Error", r"PostgreSQL.*?ERROR"),
    ("Oracle Error", r"ORA-\d{5}"),
    ("Unclosed Quote", r"unclosed quotation mark"),
    ("OLEDB Error", r"Microsoft OLE DB"),
    ("SQL Server Error", r"SQL Server|Driver.*? SQL[\-_]Server"),
    ("SQLite Error", r"SQLITE_ERROR|SQLite/JDBCDriver"),
    (
        "Access Error",
        r"Microsoft Access Driver|JET Database Engine|Access Database Engine",
    ),
];

/// Payload keywords that make the server stall on purpose.
const BLOCKING_KEYWORDS: [&str; 3] = ["sleep", "waitfor", "benchmark"];

static COMPILED_SIGNATURES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    ERROR_SIGNATURES
        .iter()
        .map(|(name, pattern)| {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("valid error signature");
            (*name, re)
        })
        .collect()
});

static ERROR_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"\b(error|exception)\b")
        .case_insensitive(true)
        .build()
        .expect("valid error text regex")
});

static FORM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form").expect("valid form selector"));

const DIFF_DEADLINE: Duration = Duration::from_millis(500);

pub fn match_error_signature(body: &str) -> Option<&'static str> {
    COMPILED_SIGNATURES
        .iter()
        .find(|(_, re)| re.is_match(body))
        .map(|(name, _)| *name)
}

pub fn is_time_based(payload: &str) -> bool {
    let lower = payload.to_ascii_lowercase();
    BLOCKING_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Character-level similarity in `[0, 1]`: twice the matched characters over
/// the combined length. Identical inputs score exactly 1.0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let mut config = TextDiff::configure();
    config.timeout(DIFF_DEADLINE);
    f64::from(config.diff_chars(a, b).ratio())
}

/// Coarse page features compared between a control response and a test response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageShape {
    pub form_count: usize,
    pub error_text: bool,
    pub mentions_sql: bool,
}

impl PageShape {
    pub fn of(html: &str) -> Self {
        let document = Html::parse_document(html);
        let form_count = document.select(&FORM_SELECTOR).count();
        let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
        Self {
            form_count,
            error_text: ERROR_TEXT_RE.is_match(&text),
            mentions_sql: html.to_uppercase().contains("SQL"),
        }
    }

    /// Describes how `test` differs from `self`, if it does in a way that
    /// suggests the injected input changed server behaviour.
    pub fn change_from(&self, test: &PageShape) -> Option<String> {
        if self.form_count != test.form_count {
            return Some(format!(
                "form count {} -> {}",
                self.form_count, test.form_count
            ));
        }
        if test.error_text && !self.error_text {
            return Some("error text appeared".to_string());
        }
        if test.mentions_sql && !self.mentions_sql {
            return Some("SQL mentioned".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_signatures_report_first_match() {
        assert_eq!(
            match_error_signature("Warning: mysql_fetch_array() expects parameter 1"),
            Some("MySQL Error")
        );
        assert_eq!(
            match_error_signature("You have an error in your SQL syntax; check the manual"),
            Some("SQL Error")
        );
        assert_eq!(match_error_signature("ora-01756: quoted string"), Some("Oracle Error"));
        assert_eq!(
            match_error_signature("Unclosed quotation mark after the character string"),
            Some("Unclosed Quote")
        );
        assert_eq!(match_error_signature("<h1>Welcome</h1>"), None);
    }

    #[test]
    fn time_based_payloads_are_recognised() {
        assert!(is_time_based("1' OR SLEEP(5)--"));
        assert!(is_time_based("'; WAITFOR DELAY '0:0:5'--"));
        assert!(is_time_based("1 AND pg_sleep(5)"));
        assert!(!is_time_based("' OR 1=1--"));
    }

    #[test]
    fn similarity_ratio_bounds() {
        assert_eq!(similarity_ratio("same page", "same page"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
        let r = similarity_ratio("abcdefgh", "abcdxxxx");
        assert!((r - 0.5).abs() < 1e-6, "ratio {r}");
        assert!(similarity_ratio("aaaa", "zzzz") < 0.01);
    }

    #[test]
    fn shape_change_detects_lost_form_and_new_errors() {
        let control = PageShape::of("<html><form></form><p>Login</p></html>");
        let same = PageShape::of("<html><form></form><p>Login</p></html>");
        assert_eq!(control.change_from(&same), None);

        let no_form = PageShape::of("<html><p>Login</p></html>");
        assert_eq!(
            control.change_from(&no_form).as_deref(),
            Some("form count 1 -> 0")
        );

        let errored = PageShape::of("<html><form></form><p>Fatal error occurred</p></html>");
        assert_eq!(
            control.change_from(&errored).as_deref(),
            Some("error text appeared")
        );

        let sql = PageShape::of("<html><form></form><!-- sqlstate --></html>");
        assert_eq!(control.change_from(&sql).as_deref(), Some("SQL mentioned"));
    }

    #[test]
    fn error_text_already_in_control_is_not_a_change() {
        let control = PageShape::of("<form></form><p>Error: please log in</p>");
        let test = PageShape::of("<form></form><p>Error: please log in again</p>");
        assert_eq!(control.change_from(&test), None);
    }
}
