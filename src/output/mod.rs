use serde::Serialize;

use crate::bruteforcer::ProbeResult;
use crate::crawler::{PageOutcome, PageResult};
use crate::detector::Vulnerability;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Page,
    Resource,
    Injection,
}

/// One flat line of the report.
#[derive(Clone, Debug, Serialize)]
pub struct OutputRecord {
    pub kind: RecordKind,
    pub url: String,
    pub status: Option<u16>,
    pub size: Option<usize>,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerability: Option<Vulnerability>,
}

pub fn build_records(
    pages: &[PageResult],
    resources: &[ProbeResult],
    vulnerabilities: &[Vulnerability],
) -> Vec<OutputRecord> {
    let mut out = Vec::with_capacity(pages.len() + resources.len() + vulnerabilities.len());
    for p in pages {
        let detail = match &p.outcome {
            PageOutcome::Ok => format!(
                "depth={} links={} forms={}",
                p.depth,
                p.links.len(),
                p.forms.len()
            ),
            PageOutcome::Skipped => format!("depth={} skipped", p.depth),
            PageOutcome::Error(reason) => format!("depth={} error={reason}", p.depth),
        };
        out.push(OutputRecord {
            kind: RecordKind::Page,
            url: p.url.clone(),
            status: p.status,
            size: None,
            detail,
            vulnerability: None,
        });
    }
    for r in resources {
        out.push(OutputRecord {
            kind: RecordKind::Resource,
            url: r.url.clone(),
            status: Some(r.status),
            size: Some(r.length),
            detail: String::new(),
            vulnerability: None,
        });
    }
    for v in vulnerabilities {
        out.push(OutputRecord {
            kind: RecordKind::Injection,
            url: v.url.clone(),
            status: Some(v.status),
            size: Some(v.length),
            detail: format!(
                "{} param={} payload={} via {}",
                v.http_method,
                v.parameter,
                v.payload,
                v.methods_label()
            ),
            vulnerability: Some(v.clone()),
        });
    }
    out
}

pub fn render_text(records: &[OutputRecord]) -> Vec<u8> {
    let mut out = String::new();
    for r in records {
        let tag = match r.kind {
            RecordKind::Page => "page",
            RecordKind::Resource => "resource",
            RecordKind::Injection => "sqli",
        };
        let status = r
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("[{tag}] [{status}] {}", r.url));
        if let Some(size) = r.size {
            out.push_str(&format!(" [size: {size}]"));
        }
        if !r.detail.is_empty() {
            out.push(' ');
            out.push_str(&r.detail);
        }
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(records: &[OutputRecord]) -> Vec<u8> {
    serde_json::to_vec_pretty(records).unwrap_or_else(|_| b"[]\n".to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Detection, InjectionPoint};

    fn sample() -> Vec<OutputRecord> {
        let page = PageResult {
            url: "http://h/".to_string(),
            depth: 0,
            status: Some(200),
            links: vec!["http://h/a".to_string()],
            forms: Vec::new(),
            outcome: PageOutcome::Ok,
        };
        let resource = ProbeResult {
            url: "http://h/admin.php".to_string(),
            status: 200,
            length: 512,
            headers: Default::default(),
        };
        let vuln = Vulnerability {
            kind: "SQL Injection".to_string(),
            point: InjectionPoint::Query,
            parameter: "id".to_string(),
            payload: "'".to_string(),
            detection_methods: vec![Detection::Error {
                signature: "MySQL Error".to_string(),
            }],
            url: "http://h/item.php?id=1%27".to_string(),
            http_method: "GET".to_string(),
            status: 500,
            length: 90,
        };
        build_records(&[page], &[resource], &[vuln])
    }

    #[test]
    fn text_has_one_line_per_record() {
        let text = String::from_utf8(render_text(&sample())).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[page] [200] http://h/ depth=0 links=1 forms=0");
        assert_eq!(lines[1], "[resource] [200] http://h/admin.php [size: 512]");
        assert!(lines[2].starts_with("[sqli] [500] http://h/item.php?id=1%27"));
        assert!(lines[2].ends_with("via Error: MySQL Error"));
    }

    #[test]
    fn json_carries_vulnerability_details() {
        let json: serde_json::Value = serde_json::from_slice(&render_json(&sample())).unwrap();
        let items = json.as_array().unwrap();
        assert_eq!(items[1]["kind"], "resource");
        assert_eq!(items[2]["vulnerability"]["type"], "SQL Injection");
        assert_eq!(
            items[2]["vulnerability"]["detection_methods"][0]["signal"],
            "error"
        );
        assert!(items[0].get("vulnerability").is_none());
    }

    #[test]
    fn format_inference() {
        assert_eq!(infer_format_from_path("out.JSON"), Some(OutputFormat::Json));
        assert_eq!(infer_format_from_path("out.txt"), Some(OutputFormat::Text));
        assert_eq!(infer_format_from_path("out"), None);
        assert_eq!(OutputFormat::parse("Json"), Some(OutputFormat::Json));
    }
}
