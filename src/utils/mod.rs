use std::collections::HashSet;

use url::Url;

pub const DEFAULT_EXTENSIONS: [&str; 3] = ["", ".php", ".html"];

pub fn parse_u16_set_csv(value: &str) -> Result<HashSet<u16>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("list is empty".to_string());
    }
    let mut out = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let code: u16 = item
            .parse()
            .map_err(|_| format!("invalid status code '{item}'"))?;
        out.insert(code);
    }
    if out.is_empty() {
        return Err("list is empty".to_string());
    }
    Ok(out)
}

pub fn parse_usize_set_csv(value: &str) -> Result<HashSet<usize>, String> {
    let mut out = HashSet::new();
    for part in value.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let size: usize = item.parse().map_err(|_| format!("invalid size '{item}'"))?;
        out.insert(size);
    }
    Ok(out)
}

/// Parses a comma separated extension list into suffixes with a leading dot.
///
/// An empty item stands for the bare entry, so `",php,.html"` yields
/// `["", ".php", ".html"]`. Order is kept and duplicates are dropped.
pub fn parse_extensions_csv(value: &str) -> Result<Vec<String>, String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in value.split(',') {
        let cleaned = part.trim().trim_start_matches('.');
        if cleaned.contains('/') || cleaned.contains(char::is_whitespace) {
            return Err(format!("invalid extension '{}'", part.trim()));
        }
        let ext = if cleaned.is_empty() {
            String::new()
        } else {
            format!(".{cleaned}")
        };
        if seen.insert(ext.to_ascii_lowercase()) {
            out.push(ext);
        }
    }
    if out.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    Ok(out)
}

pub fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

/// Original, upper-cased and lower-cased spellings of a candidate path,
/// without duplicates.
pub fn case_variants(candidate: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(3);
    for v in [
        candidate.to_string(),
        candidate.to_uppercase(),
        candidate.to_lowercase(),
    ] {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Canonical key used for visited-URL tracking: fragment and query removed,
/// trailing slashes trimmed.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.set_query(None);
    let mut out = url.to_string();
    while out.ends_with('/') {
        out.pop();
    }
    out
}

pub fn is_valid_http_url(raw: &str) -> bool {
    if raw.contains('<') || raw.contains('>') {
        return false;
    }
    match Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().map(|h| !h.is_empty()).unwrap_or(false)
        }
        Err(_) => false,
    }
}

pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Splits a `Key: Value` header argument.
pub fn parse_header_line(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid header '{raw}', expected 'Key: Value'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid header '{raw}', empty name"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Joins a base URL and a wordlist entry with exactly one slash between them.
pub fn join_candidate(base_url: &str, entry: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let entry = entry.trim_start_matches('/');
    format!("{base}/{entry}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u16_set_csv_parses_and_dedupes() {
        let set = parse_u16_set_csv("200, 404,200").unwrap();
        assert!(set.contains(&200));
        assert!(set.contains(&404));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn parse_extensions_csv_keeps_bare_entry_and_adds_dots() {
        let out = parse_extensions_csv(",php,.html,PHP").unwrap();
        assert_eq!(
            out,
            vec!["".to_string(), ".php".to_string(), ".html".to_string()]
        );
    }

    #[test]
    fn parse_extensions_csv_rejects_paths() {
        assert!(parse_extensions_csv("php,a/b").is_err());
    }

    #[test]
    fn case_variants_drop_duplicates() {
        assert_eq!(
            case_variants("Admin"),
            vec!["Admin".to_string(), "ADMIN".to_string(), "admin".to_string()]
        );
        assert_eq!(case_variants("admin"), vec!["admin", "ADMIN"]);
        assert_eq!(case_variants("123"), vec!["123"]);
    }

    #[test]
    fn normalize_url_strips_fragment_query_and_trailing_slash() {
        let url = Url::parse("https://example.com/a/b/?x=1#frag").unwrap();
        assert_eq!(normalize_url(&url), "https://example.com/a/b");
        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(normalize_url(&root), "https://example.com");
    }

    #[test]
    fn valid_http_url_checks() {
        assert!(is_valid_http_url("http://example.com/x"));
        assert!(!is_valid_http_url("ftp://example.com/x"));
        assert!(!is_valid_http_url("http://example.com/<script>"));
        assert!(!is_valid_http_url("not a url"));
    }

    #[test]
    fn same_origin_compares_host_and_port() {
        let a = Url::parse("http://example.com/a").unwrap();
        let b = Url::parse("http://example.com:80/b").unwrap();
        let c = Url::parse("http://example.com:8080/b").unwrap();
        assert!(same_origin(&a, &b));
        assert!(!same_origin(&a, &c));
    }

    #[test]
    fn join_candidate_uses_single_slash() {
        assert_eq!(
            join_candidate("http://h/app/", "/admin.php"),
            "http://h/app/admin.php"
        );
        assert_eq!(join_candidate("http://h", "admin"), "http://h/admin");
    }

    #[test]
    fn parse_header_line_splits_on_first_colon() {
        let (k, v) = parse_header_line("X-Test: a:b").unwrap();
        assert_eq!(k, "X-Test");
        assert_eq!(v, "a:b");
        assert!(parse_header_line("novalue").is_err());
    }
}
