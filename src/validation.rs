//! Template checks: HTML structure, image alt text, inline CSS and media
//! queries.
//!
//! [`validate`] is a pure function. Every call builds its own report, so it
//! is safe to run concurrently for many uploads and alongside a capture run
//! on the same document.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Outcome of the template checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub html_valid: bool,
    /// Reasons the structure check failed, joined with "; "
    pub html_errors: Option<String>,
    pub alt_tags_present: bool,
    pub total_images: usize,
    pub missing_alt_count: usize,
    pub inline_css_present: bool,
    pub inline_css_count: usize,
    pub style_tag_count: usize,
    pub media_queries_present: bool,
    pub media_query_count: usize,
}

impl ValidationReport {
    /// Safe defaults for a document that could not be parsed at all.
    pub fn degraded(err: &Error) -> Self {
        Self {
            html_valid: false,
            html_errors: Some(err.to_string()),
            alt_tags_present: false,
            total_images: 0,
            missing_alt_count: 0,
            inline_css_present: false,
            inline_css_count: 0,
            style_tag_count: 0,
            media_queries_present: false,
            media_query_count: 0,
        }
    }
}

fn regex(pattern: &'static str, desc: &'static str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid {desc} regex: {err}"))
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid selector {css}: {err:?}"))
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?i)<html[\s>/]", "html tag"))
}

fn body_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?i)<body[\s>/]", "body tag"))
}

/// Comments and the bodies of raw-text elements, where tag-like text is
/// not markup.
fn non_markup_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            regex(r"(?s)<!--.*?(-->|\z)", "comment"),
            regex(r"(?is)<script[\s>].*?(</script\s*>|\z)", "script element"),
            regex(r"(?is)<style[\s>].*?(</style\s*>|\z)", "style element"),
            regex(r"(?is)<textarea[\s>].*?(</textarea\s*>|\z)", "textarea element"),
            regex(r"(?is)<title[\s>].*?(</title\s*>|\z)", "title element"),
        ]
    })
}

/// `html` with comments and raw-text element contents blanked out.
fn markup_only(html: &str) -> String {
    non_markup_res()
        .iter()
        .fold(html.to_string(), |text, re| re.replace_all(&text, " ").into_owned())
}

fn media_query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?is)@media[^{]+\{[^}]*\}", "media query"))
}

struct Selectors {
    img: Selector,
    styled: Selector,
    style: Selector,
}

fn selectors() -> &'static Selectors {
    static SEL: OnceLock<Selectors> = OnceLock::new();
    SEL.get_or_init(|| Selectors {
        img: selector("img"),
        styled: selector("[style]"),
        style: selector("style"),
    })
}

/// Run all checks against `html`.
pub fn validate(html: &str) -> ValidationReport {
    let document = Html::parse_document(html);
    let sel = selectors();

    // The parser always synthesizes <html> and <body>, so structure is
    // judged on the source text, minus comments and raw-text elements.
    let markup = markup_only(html);
    let has_html_tag = html_tag_re().is_match(&markup);
    let has_body_tag = body_tag_re().is_match(&markup);
    let html_valid = has_html_tag || has_body_tag;
    let html_errors = if html_valid {
        None
    } else {
        Some("Missing <html> tag; Missing <body> tag".to_string())
    };

    let mut total_images = 0;
    let mut missing_alt_count = 0;
    for img in document.select(&sel.img) {
        total_images += 1;
        if img.value().attr("alt").map_or(true, str::is_empty) {
            missing_alt_count += 1;
        }
    }

    let inline_css_count = document.select(&sel.styled).count();
    let style_tag_count = document.select(&sel.style).count();
    let media_query_count = media_query_re().find_iter(html).count();

    ValidationReport {
        html_valid,
        html_errors,
        alt_tags_present: missing_alt_count == 0,
        total_images,
        missing_alt_count,
        inline_css_present: inline_css_count > 0,
        inline_css_count,
        style_tag_count,
        media_queries_present: media_query_count > 0,
        media_query_count,
    }
}

/// Like [`validate`], for raw upload bytes. Input that is not UTF-8 cannot
/// be parsed and yields [`ValidationReport::degraded`].
pub fn validate_bytes(bytes: &[u8]) -> ValidationReport {
    match std::str::from_utf8(bytes) {
        Ok(html) => validate(html),
        Err(e) => ValidationReport::degraded(&Error::ParseDegraded(e.to_string())),
    }
}

fn status(pass: bool) -> &'static str {
    if pass {
        "\u{2713} PASS"
    } else {
        "\u{2717} FAIL"
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "EMAIL TEMPLATE VALIDATION REPORT")?;
        writeln!(f, "{}", rule)?;

        writeln!(f, "\n1. HTML Validation:")?;
        if self.html_valid {
            writeln!(f, "   {} - Valid HTML structure", status(true))?;
        } else {
            writeln!(f, "   {} - Invalid HTML structure", status(false))?;
            if let Some(errors) = &self.html_errors {
                writeln!(f, "   Errors: {}", errors)?;
            }
        }

        writeln!(f, "\n2. Image Alt Tags:")?;
        if self.alt_tags_present {
            writeln!(f, "   {} - All {} images have alt tags", status(true), self.total_images)?;
        } else {
            writeln!(
                f,
                "   {} - {} of {} images missing alt tags",
                status(false),
                self.missing_alt_count,
                self.total_images
            )?;
        }

        writeln!(f, "\n3. Inline CSS:")?;
        if self.inline_css_present {
            writeln!(f, "   {} - {} elements with inline styles", status(true), self.inline_css_count)?;
        } else {
            writeln!(
                f,
                "   {} - No inline CSS found (may not render properly in email clients)",
                status(false)
            )?;
        }

        writeln!(f, "\n4. Responsive Design:")?;
        if self.media_queries_present {
            writeln!(f, "   {} - {} media queries found", status(true), self.media_query_count)?;
        } else {
            writeln!(
                f,
                "   \u{26a0} WARNING - No media queries detected (template may not be responsive)"
            )?;
        }

        write!(f, "\n{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_images_missing_alt() {
        let html = r#"<html><body>
            <img src="a.png" alt="Logo">
            <img src="b.png">
            <img src="c.png" alt="">
        </body></html>"#;
        let report = validate(html);
        assert_eq!(report.total_images, 3);
        assert_eq!(report.missing_alt_count, 2);
        assert!(!report.alt_tags_present);
    }

    #[test]
    fn no_images_means_alt_check_passes() {
        let report = validate("<html><body><p>text</p></body></html>");
        assert_eq!(report.total_images, 0);
        assert_eq!(report.missing_alt_count, 0);
        assert!(report.alt_tags_present);
    }

    #[test]
    fn detects_media_queries() {
        let html = "<html><head><style>@media (max-width:600px){.col{width:100%}}</style></head><body></body></html>";
        let report = validate(html);
        assert!(report.media_queries_present);
        assert_eq!(report.media_query_count, 1);
        assert_eq!(report.style_tag_count, 1);
    }

    #[test]
    fn media_query_match_is_case_insensitive_and_multiline() {
        let html = "<style>\n@MEDIA screen and (max-width: 480px)\n{\n  td { display: block; }\n}\n@media print { a {} }</style>";
        assert_eq!(validate(html).media_query_count, 2);
    }

    #[test]
    fn fragment_without_html_or_body_is_invalid() {
        let report = validate("<div><p>Just a fragment</p></div>");
        assert!(!report.html_valid);
        assert_eq!(
            report.html_errors.as_deref(),
            Some("Missing <html> tag; Missing <body> tag")
        );
    }

    #[test]
    fn tags_inside_comments_or_scripts_are_not_structure() {
        let commented = validate("<!-- converted from <html> export --><div><p>fragment</p></div>");
        assert!(!commented.html_valid);

        let scripted = validate("<div><script>var s = '<body>';</script></div>");
        assert!(!scripted.html_valid);

        let titled = validate("<title>About <html> tags</title><textarea><body></textarea>");
        assert!(!titled.html_valid);

        // real tags around those still count
        let real = validate("<!-- header --><html><script>var s = '</p>';</script></html>");
        assert!(real.html_valid);
    }

    #[test]
    fn body_alone_is_enough_structure() {
        let report = validate("<BODY style=\"margin:0\"><p>hi</p></BODY>");
        assert!(report.html_valid);
        assert!(report.html_errors.is_none());
    }

    #[test]
    fn counts_inline_styles() {
        let html = r#"<html><body style="margin:0">
            <table style="width:100%"><tr><td style="">x</td><td>y</td></tr></table>
        </body></html>"#;
        let report = validate(html);
        assert_eq!(report.inline_css_count, 3);
        assert!(report.inline_css_present);
        assert_eq!(report.style_tag_count, 0);
    }

    #[test]
    fn invalid_utf8_degrades_to_safe_defaults() {
        let report = validate_bytes(&[0x3c, 0x68, 0xff, 0xfe]);
        assert!(!report.html_valid);
        assert!(!report.alt_tags_present);
        assert!(!report.inline_css_present);
        assert!(!report.media_queries_present);
        assert_eq!(report.total_images, 0);
        assert!(report.html_errors.unwrap().starts_with("Failed to parse HTML"));
    }

    #[test]
    fn validation_is_independent_per_call() {
        let first = validate("<html><body><img src=x></body></html>");
        let second = validate("<html><body></body></html>");
        assert_eq!(first.missing_alt_count, 1);
        assert_eq!(second.missing_alt_count, 0);
    }

    #[test]
    fn text_report_lists_each_section() {
        let report = validate("<html><body><img src=x></body></html>");
        let text = report.to_string();
        assert!(text.contains("EMAIL TEMPLATE VALIDATION REPORT"));
        assert!(text.contains("1 of 1 images missing alt tags"));
        assert!(text.contains("No inline CSS found"));
        assert!(text.contains("WARNING - No media queries detected"));
    }
}
