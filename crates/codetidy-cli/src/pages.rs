use codetidy_core::SELECTABLE_LANGUAGES;
use std::fmt::Write;

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Default)]
pub(crate) struct WorkflowView {
    pub warning: Option<String>,
    pub standardized_code: Option<String>,
    pub test_cases: Option<String>,
    pub report: Option<String>,
    pub raw_reply: Option<String>,
}

impl WorkflowView {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warning: Some(message.into()),
            ..Self::default()
        }
    }
}

const PAGE_STYLE: &str = "body{font-family:sans-serif;max-width:60rem;margin:2rem auto;padding:0 1rem}\
textarea{width:100%;font-family:monospace}\
pre{background:#f4f4f4;padding:1rem;overflow-x:auto}\
.warning{color:#a40000;border:1px solid #a40000;padding:0.5rem}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">\
<title>{title}</title><style>{PAGE_STYLE}</style></head>\n\
<body>\n<h1>{title}</h1>\n{body}</body></html>\n"
    )
}

pub(crate) fn login_page(warning: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(warning) = warning {
        let _ = write!(body, "<p class=\"warning\">{}</p>\n", escape_html(warning));
    }
    body.push_str(
        "<form method=\"post\" action=\"/login\">\n\
<p><label>Email <input type=\"email\" name=\"email\"></label></p>\n\
<p><label>Password <input type=\"password\" name=\"password\"></label></p>\n\
<p><button type=\"submit\">Log in</button></p>\n\
</form>\n",
    );
    page("Code Standardizer — Login", &body)
}

pub(crate) fn main_page(email: &str, view: &WorkflowView) -> String {
    let mut body = String::new();
    let _ = write!(body, "<p>Logged in as {}</p>\n", escape_html(email));

    if let Some(warning) = &view.warning {
        let _ = write!(body, "<p class=\"warning\">{}</p>\n", escape_html(warning));
    }

    body.push_str("<form method=\"post\" action=\"/standardize\">\n<p><label>Language <select name=\"language\">\n");
    for language in SELECTABLE_LANGUAGES {
        let hint = language.as_hint();
        let _ = write!(
            body,
            "<option value=\"{}\">{}</option>\n",
            escape_html(hint),
            escape_html(hint)
        );
    }
    body.push_str(
        "</select></label></p>\n\
<p><label>System prompt<br><textarea name=\"system_prompt\" rows=\"4\"></textarea></label></p>\n\
<p><label>Optional instructions<br><textarea name=\"instructions\" rows=\"2\"></textarea></label></p>\n\
<p><label>Coding standards (optional, paste text)<br><textarea name=\"standards\" rows=\"4\"></textarea></label></p>\n\
<p><label>Code<br><textarea name=\"code\" rows=\"12\"></textarea></label></p>\n\
<p><button type=\"submit\">Standardize code</button> \
<button type=\"submit\" formaction=\"/standardize-tests\">Standardize + generate tests (single call)</button></p>\n\
</form>\n\
<form method=\"post\" action=\"/tests\">\n\
<p><label>JavaScript entry points (comma separated, optional) \
<input type=\"text\" name=\"entry_points\"></label> \
<button type=\"submit\">Generate &amp; run tests for the stored code</button></p>\n\
</form>\n",
    );

    if let Some(code) = &view.standardized_code {
        let _ = write!(
            body,
            "<h2>Standardized code</h2>\n<pre>{}</pre>\n",
            escape_html(code)
        );
    }
    if let Some(tests) = &view.test_cases {
        let _ = write!(
            body,
            "<h2>Test cases</h2>\n<pre>{}</pre>\n",
            escape_html(tests)
        );
    }
    if let Some(report) = &view.report {
        let _ = write!(
            body,
            "<h2>Test execution report</h2>\n<pre>{}</pre>\n",
            escape_html(report)
        );
    }
    if let Some(raw) = &view.raw_reply {
        let _ = write!(
            body,
            "<h2>Raw model reply</h2>\n<pre>{}</pre>\n",
            escape_html(raw)
        );
    }

    page("Code Standardizer &amp; Test Runner", &body)
}

#[cfg(test)]
mod tests {
    use super::{WorkflowView, escape_html, login_page, main_page};

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(
            escape_html("<script>alert('&')</script>"),
            "&lt;script&gt;alert(&#39;&amp;&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn login_page_shows_warning() {
        let html = login_page(Some("Please enter both email and password."));
        assert!(html.contains("Please enter both email and password."));
        assert!(html.contains("action=\"/login\""));
    }

    #[test]
    fn main_page_lists_all_selectable_languages() {
        let html = main_page("user@example.com", &WorkflowView::default());
        for hint in ["python", "javascript", "java", "c++"] {
            assert!(html.contains(&format!("<option value=\"{hint}\">")), "missing {hint}");
        }
    }

    #[test]
    fn main_page_escapes_result_blocks() {
        let view = WorkflowView {
            standardized_code: Some("<b>bold</b>".to_string()),
            ..WorkflowView::default()
        };
        let html = main_page("user@example.com", &view);
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(!html.contains("<b>bold</b>"));
    }
}
