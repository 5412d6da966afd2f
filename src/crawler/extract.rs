use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Form, FormInput};
use crate::utils;

pub const STATIC_EXTENSIONS: [&str; 15] = [
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff", ".woff2", ".ttf", ".ico", ".css", ".js",
    ".json", ".xml", ".pdf", ".webp",
];

pub const STATIC_PATH_MARKERS: [&str; 10] = [
    "/static/",
    "/assets/",
    "/images/",
    "/img/",
    "/fonts/",
    "/css/",
    "/js/",
    "/build/",
    "/dist/",
    "_next/static",
];

/// Paths never followed: API dumps and anything that would end the session.
pub const EXCLUDED_PATH_MARKERS: [&str; 2] = ["wp-json", "logout"];

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], link[href]").expect("valid link selector"));
static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("valid script selector"));
static FORM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form").expect("valid form selector"));
static FIELD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea, select").expect("valid field selector"));
static SCRIPT_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](https?://[^"']+)["']"#).expect("valid script url regex"));

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extracted {
    pub links: Vec<String>,
    pub forms: Vec<Form>,
}

#[derive(Default)]
struct LinkSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl LinkSet {
    fn push(&mut self, url: Url, origin: &Url) {
        if !is_crawlable(&url, origin) {
            return;
        }
        let s = url.to_string();
        if self.seen.insert(s.clone()) {
            self.ordered.push(s);
        }
    }
}

/// Pulls same-origin, non-static links and every form out of an HTML page.
///
/// Relative references resolve against `page_url`. Links keep their first
/// occurrence order.
pub fn extract_page(page_url: &Url, html: &str, origin: &Url) -> Extracted {
    let document = Html::parse_document(html);
    let mut links = LinkSet::default();

    for element in document.select(&LINK_SELECTOR) {
        if let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve(page_url, href))
        {
            links.push(url, origin);
        }
    }

    for script in document.select(&SCRIPT_SELECTOR) {
        let text: String = script.text().collect();
        for cap in SCRIPT_URL_RE.captures_iter(&text) {
            if let Ok(mut url) = Url::parse(&cap[1]) {
                url.set_fragment(None);
                links.push(url, origin);
            }
        }
    }

    let forms = document
        .select(&FORM_SELECTOR)
        .map(|form| parse_form(page_url, form))
        .collect();

    Extracted {
        links: links.ordered,
        forms,
    }
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }
    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Same origin as the seed, http(s), and not a static asset or excluded path.
pub fn is_crawlable(url: &Url, origin: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") || !utils::same_origin(url, origin) {
        return false;
    }
    let path = url.path().to_ascii_lowercase();
    if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    if STATIC_PATH_MARKERS.iter().any(|m| path.contains(m)) {
        return false;
    }
    !EXCLUDED_PATH_MARKERS.iter().any(|m| path.contains(m))
}

fn parse_form(page_url: &Url, form: ElementRef<'_>) -> Form {
    let action = form
        .value()
        .attr("action")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .and_then(|a| page_url.join(a).ok())
        .unwrap_or_else(|| page_url.clone());

    let method = form
        .value()
        .attr("method")
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "GET".to_string());

    let inputs = form
        .select(&FIELD_SELECTOR)
        .map(|field| {
            let el = field.value();
            let name = el
                .attr("name")
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            let input_type = el
                .attr("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text".to_string());
            let default_value = match el.attr("value") {
                Some(v) => v.to_string(),
                None if el.name() == "textarea" => field.text().collect(),
                None => String::new(),
            };
            FormInput {
                name,
                input_type,
                default_value,
            }
        })
        .collect();

    Form {
        action: action.to_string(),
        method,
        inputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://target.test/").unwrap()
    }

    #[test]
    fn keeps_same_origin_links_in_order_without_duplicates() {
        let html = r#"
            <a href="/b">b</a>
            <a href="a">a</a>
            <a href="/b#top">b again</a>
            <a href="http://other.test/x">external</a>
            <a href="mailto:me@target.test">mail</a>
            <link rel="alternate" href="/feed">
        "#;
        let page = Url::parse("http://target.test/dir/").unwrap();
        let out = extract_page(&page, html, &origin());
        assert_eq!(
            out.links,
            vec![
                "http://target.test/b".to_string(),
                "http://target.test/dir/a".to_string(),
                "http://target.test/feed".to_string(),
            ]
        );
    }

    #[test]
    fn drops_static_assets_and_excluded_paths() {
        let html = r#"
            <a href="/logo.PNG">img</a>
            <a href="/assets/app">assets</a>
            <a href="/_next/static/chunk">next</a>
            <a href="/wp-json/wp/v2/users">api</a>
            <a href="/account/logout">out</a>
            <a href="/login">in</a>
        "#;
        let out = extract_page(&origin(), html, &origin());
        assert_eq!(out.links, vec!["http://target.test/login".to_string()]);
    }

    #[test]
    fn finds_absolute_urls_inside_scripts() {
        let html = r#"<script>var api = "http://target.test/api/v1/items"; var cdn='https://cdn.test/x';</script>"#;
        let out = extract_page(&origin(), html, &origin());
        assert_eq!(out.links, vec!["http://target.test/api/v1/items".to_string()]);
    }

    #[test]
    fn parses_forms_with_defaults() {
        let html = r#"
            <form action="/search">
                <input name="q">
                <input type="submit" value="Go">
            </form>
            <form method="post">
                <input type="hidden" name="csrf_token" value="abc">
                <textarea name="comment">hello</textarea>
                <select name="sort"></select>
            </form>
        "#;
        let page = Url::parse("http://target.test/page").unwrap();
        let out = extract_page(&page, html, &origin());
        assert_eq!(out.forms.len(), 2);

        let search = &out.forms[0];
        assert_eq!(search.action, "http://target.test/search");
        assert_eq!(search.method, "GET");
        assert_eq!(search.inputs[0].name.as_deref(), Some("q"));
        assert_eq!(search.inputs[0].input_type, "text");
        assert_eq!(search.inputs[0].default_value, "");
        assert_eq!(search.inputs[1].name, None);

        let comment = &out.forms[1];
        assert_eq!(comment.action, "http://target.test/page");
        assert_eq!(comment.method, "POST");
        assert_eq!(comment.inputs[0].default_value, "abc");
        assert_eq!(comment.inputs[1].default_value, "hello");
        assert_eq!(comment.inputs[2].input_type, "text");
    }
}
