use crate::forms::{non_empty, parse_cookies, parse_form_body};
use crate::pages::{WorkflowView, login_page, main_page};
use crate::session::{Session, SessionStore, StoredCode};
use anyhow::{Context, Result, anyhow};
use codetidy_core::{Language, ReplyParseError, StandardizeRequest, Standardizer};
use codetidy_llm::LlmClient;
use codetidy_llm_groq::GroqClient;
use codetidy_runner::RunLimits;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

const SESSION_COOKIE: &str = "codetidy_session";
const MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

pub(crate) struct AppState<C: LlmClient> {
    pub standardizer: Standardizer<C>,
    pub limits: RunLimits,
    pub sessions: SessionStore,
}

struct Request {
    method: String,
    path: String,
    cookies: HashMap<String, String>,
    body: String,
}

struct Response {
    status: u16,
    content_type: &'static str,
    extra_headers: Vec<String>,
    body: Vec<u8>,
}

impl Response {
    fn html(markup: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            extra_headers: Vec::new(),
            body: markup.into_bytes(),
        }
    }

    fn redirect(location: &str, extra_headers: Vec<String>) -> Self {
        let mut headers = vec![format!("Location: {location}")];
        headers.extend(extra_headers);
        Self {
            status: 303,
            content_type: "text/plain; charset=utf-8",
            extra_headers: headers,
            body: Vec::new(),
        }
    }

    fn plain(status: u16, text: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            extra_headers: Vec::new(),
            body: text.as_bytes().to_vec(),
        }
    }
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        303 => "See Other",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

fn read_request(stream: &mut TcpStream) -> Result<Request> {
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .context("failed setting read timeout")?;

    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0_u8; 8192];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let read = stream.read(&mut chunk).context("failed reading request")?;
        if read == 0 {
            return Err(anyhow!("connection closed mid-request"));
        }
        buf.extend_from_slice(&chunk[..read]);
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = header_text.lines();
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts
        .next()
        .unwrap_or("/")
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let mut content_length = 0_usize;
    let mut cookies = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("cookie") {
                cookies.extend(parse_cookies(value));
            }
        }
    }
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let body_start = (header_end + 4).min(buf.len());
    let mut body = buf[body_start..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut chunk).context("failed reading request body")?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(Request {
        method,
        path,
        cookies,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn write_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        status_text(response.status),
        response.content_type,
        response.body.len()
    );
    for header in &response.extra_headers {
        head.push_str(header);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let mut payload = head.into_bytes();
    payload.extend_from_slice(&response.body);
    stream.write_all(&payload).context("failed writing response")?;
    Ok(())
}

fn current_session<C: LlmClient>(
    state: &AppState<C>,
    req: &Request,
) -> Option<(String, Session)> {
    let id = req.cookies.get(SESSION_COOKIE)?;
    let session = state.sessions.get(id)?;
    Some((id.clone(), session))
}

fn handle_root<C: LlmClient>(state: &AppState<C>, req: &Request) -> Response {
    match current_session(state, req) {
        Some((_, session)) => Response::html(main_page(&session.email, &WorkflowView::default())),
        None => Response::html(login_page(None)),
    }
}

fn handle_login<C: LlmClient>(state: &AppState<C>, req: &Request) -> Response {
    let form = parse_form_body(&req.body);
    let email = non_empty(form.get("email"));
    let password = non_empty(form.get("password"));

    // Presentational gating only: any non-empty pair is accepted.
    let (Some(email), Some(_)) = (email, password) else {
        return Response::html(login_page(Some("Please enter both email and password.")));
    };

    let id = state.sessions.create(&email);
    Response::redirect(
        "/",
        vec![format!("Set-Cookie: {SESSION_COOKIE}={id}; HttpOnly; Path=/")],
    )
}

fn form_request(form: &HashMap<String, String>) -> Result<StandardizeRequest, WorkflowView> {
    let Some(language) = form.get("language").and_then(|v| Language::from_hint(v)) else {
        return Err(WorkflowView::warning("Please select a supported language."));
    };

    let req = StandardizeRequest {
        language,
        code: form.get("code").cloned().unwrap_or_default(),
        system_prompt: form.get("system_prompt").cloned().unwrap_or_default(),
        standards_doc: non_empty(form.get("standards")),
        extra_instructions: non_empty(form.get("instructions")),
    };
    if let Err(err) = req.validate() {
        return Err(WorkflowView::warning(format!("Please check your input: {err}")));
    }
    Ok(req)
}

fn handle_standardize<C: LlmClient>(state: &AppState<C>, req: &Request) -> Response {
    let Some((id, session)) = current_session(state, req) else {
        return Response::html(login_page(Some("Please log in first.")));
    };

    let form = parse_form_body(&req.body);
    let standardize_req = match form_request(&form) {
        Ok(r) => r,
        Err(view) => return Response::html(main_page(&session.email, &view)),
    };

    // API failures degrade to a warning and an empty result.
    let view = match state.standardizer.standardize(&standardize_req) {
        Ok(code) => {
            state.sessions.store_code(
                &id,
                StoredCode {
                    language: standardize_req.language,
                    code: code.clone(),
                    system_prompt: standardize_req.system_prompt.clone(),
                },
            );
            WorkflowView {
                standardized_code: Some(code),
                ..WorkflowView::default()
            }
        }
        Err(err) => WorkflowView::warning(format!("LLM API error: {err:#}")),
    };
    Response::html(main_page(&session.email, &view))
}

fn handle_tests<C: LlmClient>(state: &AppState<C>, req: &Request) -> Response {
    let Some((_, session)) = current_session(state, req) else {
        return Response::html(login_page(Some("Please log in first.")));
    };
    let Some(stored) = session.standardized else {
        return Response::html(main_page(
            &session.email,
            &WorkflowView::warning("Please generate the standardized code first."),
        ));
    };

    let form = parse_form_body(&req.body);
    let entry_points: Vec<String> = form
        .get("entry_points")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let tests = match state.standardizer.generate_tests(
        stored.language,
        &stored.code,
        &stored.system_prompt,
    ) {
        Ok(tests) => tests,
        Err(err) => {
            return Response::html(main_page(
                &session.email,
                &WorkflowView::warning(format!("LLM API error: {err:#}")),
            ));
        }
    };

    let view = match codetidy_runner::run_tests(
        stored.language,
        &stored.code,
        &tests,
        &entry_points,
        &state.limits,
    ) {
        Ok(report) => WorkflowView {
            test_cases: Some(tests),
            report: Some(report),
            ..WorkflowView::default()
        },
        Err(err) => WorkflowView {
            test_cases: Some(tests),
            warning: Some(format!("test execution failed: {err:#}")),
            ..WorkflowView::default()
        },
    };
    Response::html(main_page(&session.email, &view))
}

fn handle_structured<C: LlmClient>(state: &AppState<C>, req: &Request) -> Response {
    let Some((id, session)) = current_session(state, req) else {
        return Response::html(login_page(Some("Please log in first.")));
    };

    let form = parse_form_body(&req.body);
    let standardize_req = match form_request(&form) {
        Ok(r) => r,
        Err(view) => return Response::html(main_page(&session.email, &view)),
    };

    let view = match state.standardizer.standardize_with_tests(&standardize_req) {
        Ok(bundle) => {
            state.sessions.store_code(
                &id,
                StoredCode {
                    language: standardize_req.language,
                    code: bundle.standardized_code.clone(),
                    system_prompt: standardize_req.system_prompt.clone(),
                },
            );
            WorkflowView {
                standardized_code: Some(bundle.standardized_code),
                test_cases: Some(bundle.test_cases),
                ..WorkflowView::default()
            }
        }
        Err(err) => match err.downcast_ref::<ReplyParseError>() {
            Some(parse_err) => WorkflowView {
                warning: Some(
                    "The model reply could not be parsed; showing the raw response.".to_string(),
                ),
                raw_reply: Some(parse_err.raw.clone()),
                ..WorkflowView::default()
            },
            None => WorkflowView::warning(format!("LLM API error: {err:#}")),
        },
    };
    Response::html(main_page(&session.email, &view))
}

fn route<C: LlmClient>(state: &AppState<C>, req: &Request) -> Response {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/") => handle_root(state, req),
        ("POST", "/login") => handle_login(state, req),
        ("POST", "/standardize") => handle_standardize(state, req),
        ("POST", "/tests") => handle_tests(state, req),
        ("POST", "/standardize-tests") => handle_structured(state, req),
        ("GET", _) => Response::plain(404, "Not Found"),
        _ => Response::plain(405, "Method Not Allowed"),
    }
}

fn handle_connection<C: LlmClient>(stream: &mut TcpStream, state: &AppState<C>) -> Result<()> {
    let req = read_request(stream)?;
    let response = route(state, &req);
    write_response(stream, &response)
}

pub(crate) fn serve(
    host: &str,
    port: u16,
    standardizer: Standardizer<GroqClient>,
    limits: RunLimits,
) -> Result<()> {
    let state = AppState {
        standardizer,
        limits,
        sessions: SessionStore::default(),
    };

    let listener = TcpListener::bind((host, port))
        .with_context(|| format!("failed binding web server on {host}:{port}"))?;
    let actual_port = listener
        .local_addr()
        .context("failed reading listener local address")?
        .port();
    eprintln!("[codetidy] serving at http://{host}:{actual_port}/");

    // One interaction at a time; the whole workflow is synchronous.
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                if let Err(err) = handle_connection(&mut stream, &state) {
                    eprintln!("error: request failed: {err:#}");
                }
            }
            Err(err) => eprintln!("error: listener failed: {err}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AppState, Request, find_header_end, route};
    use crate::session::{SessionStore, StoredCode};
    use anyhow::{Result, anyhow};
    use codetidy_core::{Language, ProgressMode, Standardizer};
    use codetidy_llm::{ChatPrompt, LlmClient, SamplingParams};
    use codetidy_runner::RunLimits;
    use std::collections::HashMap;

    struct StubClient {
        fail: bool,
        output: String,
    }

    impl LlmClient for StubClient {
        fn complete(
            &self,
            _prompt: &ChatPrompt,
            _model: &str,
            _params: &SamplingParams,
        ) -> Result<String> {
            if self.fail {
                return Err(anyhow!("stub outage"));
            }
            Ok(self.output.clone())
        }
    }

    fn state(fail: bool, output: &str) -> AppState<StubClient> {
        AppState {
            standardizer: Standardizer {
                client: StubClient {
                    fail,
                    output: output.to_string(),
                },
                model: "test-model".to_string(),
                params: SamplingParams::default(),
                progress_mode: ProgressMode::Silent,
            },
            limits: RunLimits::default(),
            sessions: SessionStore::default(),
        }
    }

    fn request(method: &str, path: &str, session_id: Option<&str>, body: &str) -> Request {
        let mut cookies = HashMap::new();
        if let Some(id) = session_id {
            cookies.insert("codetidy_session".to_string(), id.to_string());
        }
        Request {
            method: method.to_string(),
            path: path.to_string(),
            cookies,
            body: body.to_string(),
        }
    }

    fn body_text(response: &super::Response) -> String {
        String::from_utf8_lossy(&response.body).into_owned()
    }

    #[test]
    fn finds_header_boundary() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(14));
        assert_eq!(find_header_end(b"partial"), None);
    }

    #[test]
    fn root_without_session_shows_login() {
        let state = state(false, "");
        let response = route(&state, &request("GET", "/", None, ""));
        assert!(body_text(&response).contains("action=\"/login\""));
    }

    #[test]
    fn login_with_empty_fields_warns() {
        let state = state(false, "");
        let response = route(
            &state,
            &request("POST", "/login", None, "email=&password="),
        );
        assert!(body_text(&response).contains("Please enter both email and password."));
    }

    #[test]
    fn login_sets_cookie_and_redirects() {
        let state = state(false, "");
        let response = route(
            &state,
            &request("POST", "/login", None, "email=a%40example.com&password=x"),
        );
        assert_eq!(response.status, 303);
        assert!(response.extra_headers.iter().any(|h| h == "Location: /"));
        assert!(
            response
                .extra_headers
                .iter()
                .any(|h| h.starts_with("Set-Cookie: codetidy_session="))
        );
    }

    #[test]
    fn standardize_requires_login() {
        let state = state(false, "print(1)");
        let response = route(
            &state,
            &request("POST", "/standardize", None, "language=python&code=x"),
        );
        assert!(body_text(&response).contains("Please log in first."));
    }

    #[test]
    fn standardize_validates_empty_code_before_any_call() {
        let state = state(true, "");
        let id = state.sessions.create("user@example.com");
        let response = route(
            &state,
            &request(
                "POST",
                "/standardize",
                Some(&id),
                "language=python&code=&system_prompt=sys",
            ),
        );
        let text = body_text(&response);
        assert!(text.contains("code must not be empty"));
        assert!(!text.contains("stub outage"));
    }

    #[test]
    fn standardize_stores_code_and_renders_it() {
        let state = state(false, "```python\nprint(1)\n```");
        let id = state.sessions.create("user@example.com");
        let response = route(
            &state,
            &request(
                "POST",
                "/standardize",
                Some(&id),
                "language=python&code=print+%281%29&system_prompt=sys",
            ),
        );
        assert!(body_text(&response).contains("print(1)"));

        let session = state.sessions.get(&id).expect("session should exist");
        let stored = session.standardized.expect("code should be stored");
        assert_eq!(stored.code, "print(1)");
        assert_eq!(stored.language, Language::Python);
    }

    #[test]
    fn api_failure_degrades_to_warning() {
        let state = state(true, "");
        let id = state.sessions.create("user@example.com");
        let response = route(
            &state,
            &request(
                "POST",
                "/standardize",
                Some(&id),
                "language=python&code=print%281%29&system_prompt=sys",
            ),
        );
        let text = body_text(&response);
        assert_eq!(response.status, 200);
        assert!(text.contains("LLM API error"));
        assert!(text.contains("stub outage"));
    }

    #[test]
    fn tests_without_stored_code_warn() {
        let state = state(false, "");
        let id = state.sessions.create("user@example.com");
        let response = route(&state, &request("POST", "/tests", Some(&id), ""));
        assert!(body_text(&response).contains("generate the standardized code first"));
    }

    #[test]
    fn tests_for_unsupported_language_report_in_page() {
        let state = state(false, "```java\nclass T {}\n```");
        let id = state.sessions.create("user@example.com");
        state.sessions.store_code(
            &id,
            StoredCode {
                language: Language::Java,
                code: "class A {}".to_string(),
                system_prompt: "sys".to_string(),
            },
        );
        let response = route(&state, &request("POST", "/tests", Some(&id), ""));
        let text = body_text(&response);
        assert!(text.contains("not supported"));
    }

    #[test]
    fn structured_reply_renders_both_fields() {
        let state = state(
            false,
            r#"{"standardized_code":"print(1)","test_cases":"assert True"}"#,
        );
        let id = state.sessions.create("user@example.com");
        let response = route(
            &state,
            &request(
                "POST",
                "/standardize-tests",
                Some(&id),
                "language=python&code=x&system_prompt=sys",
            ),
        );
        let text = body_text(&response);
        assert!(text.contains("print(1)"));
        assert!(text.contains("assert True"));
    }

    #[test]
    fn malformed_structured_reply_shows_raw_text() {
        let state = state(false, "Sure! Here is your code.");
        let id = state.sessions.create("user@example.com");
        let response = route(
            &state,
            &request(
                "POST",
                "/standardize-tests",
                Some(&id),
                "language=python&code=x&system_prompt=sys",
            ),
        );
        let text = body_text(&response);
        assert!(text.contains("could not be parsed"));
        assert!(text.contains("Sure! Here is your code."));
    }

    #[test]
    fn unknown_path_is_not_found() {
        let state = state(false, "");
        let response = route(&state, &request("GET", "/missing", None, ""));
        assert_eq!(response.status, 404);
    }
}
