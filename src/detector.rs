//! Scores raw HTML to decide whether JavaScript execution is required.

use crate::page::{Confidence, DetectionReport};
use once_cell::sync::Lazy;
use regex::Regex;

struct Signal {
    reason: &'static str,
    weight: i32,
    matches: fn(&HtmlFacts) -> bool,
}

/// Precomputed facts about the HTML so each signal's `matches` closure stays
/// a cheap lookup instead of re-scanning the document.
struct HtmlFacts<'a> {
    html: &'a str,
    text_ratio: f64,
    html_len: usize,
    script_ratio: f64,
    heading_count: usize,
    substantial_paragraphs: usize,
}

static SCRIPT_STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</\1>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]*>").unwrap());
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h[1-6]\b").unwrap());
static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").unwrap());

static SIGNALS: Lazy<Vec<Signal>> = Lazy::new(|| {
    vec![
        Signal {
            reason: "React root div (empty)",
            weight: 4,
            matches: |f| {
                static RE: Lazy<Regex> =
                    Lazy::new(|| Regex::new(r#"(?is)<div\s+id=["']root["']\s*>\s*</div>"#).unwrap());
                RE.is_match(f.html)
            },
        },
        Signal {
            reason: "App root div (empty)",
            weight: 4,
            matches: |f| {
                static RE: Lazy<Regex> =
                    Lazy::new(|| Regex::new(r#"(?is)<div\s+id=["']app["']\s*>\s*</div>"#).unwrap());
                RE.is_match(f.html)
            },
        },
        Signal {
            reason: "Next.js __next container",
            weight: 3,
            matches: |f| {
                static RE: Lazy<Regex> =
                    Lazy::new(|| Regex::new(r#"(?is)<div\s+id=["']__next["']"#).unwrap());
                RE.is_match(f.html)
            },
        },
        Signal {
            reason: "Angular app-root",
            weight: 4,
            matches: |f| f.html.to_ascii_lowercase().contains("<app-root"),
        },
        Signal {
            reason: "React data-reactroot attribute",
            weight: 3,
            matches: |f| f.html.contains("data-reactroot"),
        },
        Signal {
            reason: "Vue data-vue-app attribute",
            weight: 4,
            matches: |f| f.html.contains("data-vue-app"),
        },
        Signal {
            reason: "Angular ng-version attribute",
            weight: 3,
            matches: |f| f.html.contains("ng-version="),
        },
        Signal {
            reason: "Nuxt __nuxt token",
            weight: 2,
            matches: |f| f.html.contains("__nuxt"),
        },
        Signal {
            reason: "Next.js __NEXT_DATA__ global",
            weight: 3,
            matches: |f| f.html.contains("window.__NEXT_DATA__"),
        },
        Signal {
            reason: "Redux-style __INITIAL_STATE__ global",
            weight: 2,
            matches: |f| f.html.contains("window.__INITIAL_STATE__"),
        },
        Signal {
            reason: "Svelte class prefix",
            weight: 2,
            matches: |f| f.html.contains("svelte-"),
        },
        Signal {
            reason: "Ember application class",
            weight: 3,
            matches: |f| f.html.contains("ember-application"),
        },
        Signal {
            reason: "Very low text/HTML ratio on a large document",
            weight: 4,
            matches: |f| f.text_ratio < 0.05 && f.html_len > 5_000,
        },
        Signal {
            reason: "Low text/HTML ratio on a large document",
            weight: 2,
            matches: |f| !(f.text_ratio < 0.05 && f.html_len > 5_000) && f.text_ratio < 0.10 && f.html_len > 10_000,
        },
        Signal {
            reason: "Script bytes dominate HTML bytes",
            weight: 2,
            matches: |f| f.script_ratio > 0.50,
        },
        Signal {
            reason: "Loading/skeleton/spinner markers",
            weight: 2,
            matches: |f| {
                static RE: Lazy<Regex> = Lazy::new(|| {
                    Regex::new(r#"(?is)class=["'][^"']*(loading|skeleton|spinner)[^"']*["']|aria-label=["']loading["']"#)
                        .unwrap()
                });
                RE.find_iter(f.html).count() >= 2
            },
        },
        Signal {
            reason: "No headings and sparse paragraph content on a large document",
            weight: 3,
            matches: |f| f.heading_count == 0 && f.substantial_paragraphs < 3 && f.html_len > 20_000,
        },
        Signal {
            reason: "Meta generator mentions a JS framework",
            weight: 2,
            matches: |f| {
                static RE: Lazy<Regex> = Lazy::new(|| {
                    Regex::new(r#"(?is)<meta\s+name=["']generator["']\s+content=["'][^"']*(React|Next\.js)[^"']*["']"#)
                        .unwrap()
                });
                RE.is_match(f.html)
            },
        },
        Signal {
            reason: "Structured data present alongside substantial text",
            weight: -2,
            matches: |f| f.html.contains("application/ld+json") && f.text_ratio > 0.15,
        },
    ]
});

/// `detectSPA(html) -> DetectionReport`.
pub fn detect_spa(html: &str) -> DetectionReport {
    let facts = compute_facts(html);

    let mut score = 0;
    let mut reasons = Vec::new();

    for signal in SIGNALS.iter() {
        if (signal.matches)(&facts) {
            score += signal.weight;
            reasons.push(signal.reason.to_string());
        }
    }

    let is_spa = score >= 4;
    let confidence = if score >= 8 {
        Confidence::High
    } else if score >= 4 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    DetectionReport {
        is_spa,
        score,
        confidence,
        reasons,
    }
}

fn compute_facts(html: &str) -> HtmlFacts<'_> {
    let html_len = html.len();
    let without_script_style = SCRIPT_STYLE_RE.replace_all(html, "");
    let text_only = TAG_RE.replace_all(&without_script_style, "");
    let text_len = text_only.trim().len();
    let text_ratio = if html_len == 0 {
        0.0
    } else {
        text_len as f64 / html_len as f64
    };

    let script_bytes: usize = SCRIPT_RE.find_iter(html).map(|m| m.len()).sum();
    let script_ratio = if html_len == 0 {
        0.0
    } else {
        script_bytes as f64 / html_len as f64
    };

    let heading_count = HEADING_RE.find_iter(html).count();
    let substantial_paragraphs = PARAGRAPH_RE
        .captures_iter(html)
        .filter(|c| {
            let inner = TAG_RE.replace_all(&c[1], "");
            inner.trim().len() >= 20
        })
        .count();

    HtmlFacts {
        html,
        text_ratio,
        html_len,
        script_ratio,
        heading_count,
        substantial_paragraphs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_react_root_is_detected() {
        let html = r#"<html><head></head><body><div id="root"></div><script src="bundle.js"></script></body></html>"#;
        let report = detect_spa(html);
        assert!(report.is_spa);
        assert!(report.score >= 4);
        assert!(report.reasons.iter().any(|r| r == "React root div (empty)"));
    }

    #[test]
    fn angular_app_root_is_detected() {
        let html = r#"<html><body><app-root></app-root><script src="main.js"></script></body></html>"#;
        let report = detect_spa(html);
        assert!(report.is_spa);
        assert!(report.reasons.iter().any(|r| r == "Angular app-root"));
    }

    #[test]
    fn static_blog_is_not_spa() {
        let paragraph = "This is a reasonably long paragraph with more than thirty words in total, \
            describing something mundane about daily life and routines and other unremarkable things \
            that fill up a blog post nicely without any scripts at all here.";
        let html = format!(
            "<html><body><h1>My Blog</h1><p>{paragraph}</p><p>{paragraph}</p></body></html>"
        );
        let report = detect_spa(&html);
        assert!(!report.is_spa);
    }

    #[test]
    fn adding_a_positive_signal_never_decreases_score() {
        let base = r#"<html><body><h1>Title</h1><p>some content here that is reasonably long for scoring purposes yes</p></body></html>"#;
        let augmented = format!(r#"{base}<div id="app"></div>"#);
        assert!(detect_spa(&augmented).score >= detect_spa(base).score);
    }
}
