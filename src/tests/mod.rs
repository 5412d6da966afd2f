use std::collections::HashSet;
use std::time::Duration;

use url::Url;

#[test]
fn probe_candidates_expand_to_case_variants() {
    let variants = crate::utils::case_variants("Admin.php");
    assert_eq!(variants, vec!["Admin.php", "ADMIN.PHP", "admin.php"]);
    let joined: Vec<String> = variants
        .iter()
        .map(|v| crate::utils::join_candidate("http://example.com/app/", v))
        .collect();
    assert_eq!(joined[0], "http://example.com/app/Admin.php");
}

#[test]
fn lowercase_candidate_has_single_variant() {
    assert_eq!(crate::utils::case_variants("login"), vec!["login", "LOGIN"]);
    assert_eq!(crate::utils::case_variants("123"), vec!["123"]);
}

#[test]
fn tracker_key_ignores_query_and_fragment() {
    let tracker = crate::membership::VisitedSet::default();
    let a = Url::parse("http://example.com/page/?a=1#top").unwrap();
    let b = Url::parse("http://example.com/page").unwrap();
    assert!(tracker.check_and_insert(&crate::utils::normalize_url(&a)));
    assert!(!tracker.check_and_insert(&crate::utils::normalize_url(&b)));
}

#[test]
fn extracted_forms_feed_injection_fields() {
    let page = Url::parse("http://example.com/login").unwrap();
    let html = r#"<form method="post">
        <input type="text" name="user" value="guest">
        <input type="hidden" name="csrf_token" value="abc">
        <input type="submit" value="Go">
    </form>"#;
    let extracted = crate::crawler::extract::extract_page(&page, html, &page);
    assert_eq!(extracted.forms.len(), 1);
    let form = &extracted.forms[0];
    assert_eq!(form.action, "http://example.com/login");
    assert_eq!(form.method, "POST");
    let injectable: Vec<&str> = form
        .inputs
        .iter()
        .filter_map(|i| i.name.as_deref())
        .filter(|n| !crate::detector::is_csrf_field(n))
        .collect();
    assert_eq!(injectable, vec!["user"]);
}

#[test]
fn mysql_error_page_is_detected_and_changes_shape() {
    let baseline = "<html><body><form></form>Welcome</body></html>";
    let broken = "<html><body>Warning: mysql_fetch_array() expects parameter 1</body></html>";
    assert_eq!(
        crate::detector::signals::match_error_signature(broken),
        Some("MySQL Error")
    );
    let before = crate::detector::signals::PageShape::of(baseline);
    let after = crate::detector::signals::PageShape::of(broken);
    assert!(before.change_from(&after).is_some());
}

#[test]
fn sleep_payloads_are_time_based() {
    assert!(crate::detector::signals::is_time_based("1' AND SLEEP(5)--"));
    assert!(crate::detector::signals::is_time_based("'; WAITFOR DELAY '0:0:5'--"));
    assert!(!crate::detector::signals::is_time_based("' OR '1'='1"));
}

#[test]
fn probe_filters_drop_excluded_statuses() {
    let filter = crate::bruteforcer::ResultFilter {
        status: HashSet::from([403]),
        size: HashSet::new(),
    };
    let kept = filter.finalize(vec![
        crate::bruteforcer::ProbeResult {
            url: "http://example.com/admin".to_string(),
            status: 403,
            length: 300,
            headers: Default::default(),
        },
        crate::bruteforcer::ProbeResult {
            url: "http://example.com/backup.php".to_string(),
            status: 200,
            length: 512,
            headers: Default::default(),
        },
    ]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].status, 200);
}

#[tokio::test]
async fn runner_with_every_phase_skipped_is_empty() {
    let opts = crate::runner::Options {
        target: "http://127.0.0.1:1/".to_string(),
        skip_crawl: true,
        skip_probe: true,
        skip_inject: true,
        ..crate::runner::Options::default()
    };
    let runner = crate::runner::Runner::new(opts).unwrap();
    let result = runner
        .run(&crate::stop::StopSignal::new())
        .await
        .unwrap();
    assert!(result.pages.is_empty());
    assert!(result.resources.is_empty());
    assert!(result.vulnerabilities.is_empty());
    assert!(!result.interrupted);
}

#[tokio::test]
async fn runner_reports_missing_wordlist() {
    let opts = crate::runner::Options {
        target: "http://127.0.0.1:1/".to_string(),
        wordlist: crate::runner::WordlistSource::FilePath(
            "/nonexistent/thunderscan/words.txt".to_string(),
        ),
        skip_crawl: true,
        skip_inject: true,
        ..crate::runner::Options::default()
    };
    let runner = crate::runner::Runner::new(opts).unwrap();
    let err = runner
        .run(&crate::stop::StopSignal::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::runner::RunnerError::FileOpen { kind: "wordlist", .. }
    ));
}

#[tokio::test]
async fn crawl_of_unreachable_seed_records_the_error() {
    let client = crate::http::HttpClient::new(&crate::http::ClientConfig {
        max_retries: 0,
        ..crate::http::ClientConfig::crawler(Duration::from_secs(2))
    })
    .unwrap();
    let crawler = crate::crawler::Crawler::new(
        client,
        crate::crawler::CrawlConfig {
            request_delay: Duration::ZERO,
            inactivity_timeout: Duration::from_secs(5),
            ..crate::crawler::CrawlConfig::default()
        },
    );
    let pages = crawler
        .crawl("http://127.0.0.1:1/", &crate::stop::StopSignal::new())
        .await
        .unwrap();
    assert_eq!(pages.len(), 1);
    assert!(matches!(
        pages[0].outcome,
        crate::crawler::PageOutcome::Error(_)
    ));
    assert!(pages[0].links.is_empty());
}
