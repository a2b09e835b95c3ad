//! End-to-end tests of `HyperTransport` against the live mock server.
//!
//! # Design
//! Every test starts its own mock server on a random port, so the
//! `/completions` log only ever holds that test's requests. `ureq` serves as
//! an independent reference client for cross-checks.

use std::net::SocketAddr;
use std::time::Duration;

use fanout_core::{
    Client, ClientConfig, DispatchError, HttpRequest, HttpResponse, OptionKey, RequestOptions,
};
use mock_server::Echo;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Start the mock server on a random port and return its base URL.
fn start_server() -> String {
    init_tracing();
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// An address nothing listens on.
fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn echo(resp: &HttpResponse) -> Echo {
    serde_json::from_slice(resp.body().as_bytes()).unwrap()
}

fn completions(base: &str) -> Vec<String> {
    let resp = Client::new(ClientConfig::default())
        .send_request(HttpRequest::new("GET", format!("{base}/completions")))
        .unwrap();
    serde_json::from_slice(resp.body().as_bytes()).unwrap()
}

#[test]
fn single_request_round_trip() {
    let base = start_server();
    let client = Client::new(ClientConfig::default());
    let req = HttpRequest::new("GET", format!("{base}/echo?x=1"))
        .with_header("X-Tag", "a")
        .with_header("X-Tag", "b");

    let resp = client.send_request(req).unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.reason(), "OK");
    assert!(resp.is_success());
    assert!(resp.header("x-request-id").is_some());
    assert_eq!(resp.header("content-type"), Some("application/json"));

    let seen = echo(&resp);
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.path, "/echo");
    assert_eq!(seen.query.as_deref(), Some("x=1"));
    assert_eq!(seen.header_values("x-tag"), ["a", "b"]);
    assert!(seen.header_values("user-agent")[0].starts_with("fanout/"));
    assert_eq!(seen.header_values("host"), [base.trim_start_matches("http://")]);
}

#[test]
fn repeated_response_header_keeps_both_values() {
    let base = start_server();

    let resp = Client::new(ClientConfig::default())
        .send_request(HttpRequest::new("GET", format!("{base}/cookies")))
        .unwrap();

    assert_eq!(resp.headers().get_all("Set-Cookie"), ["session=abc", "theme=dark"]);
    assert_eq!(resp.header("content-type"), Some("text/plain"));
    assert_eq!(resp.body().text(), "two cookies");
}

#[test]
fn bodies_reach_the_server_verbatim() {
    let base = start_server();
    let client = Client::new(ClientConfig::default());
    let requests = vec![
        HttpRequest::new("POST", format!("{base}/echo")),
        HttpRequest::new("POST", format!("{base}/echo"))
            .with_header("Content-Type", "text/plain")
            .with_body("line one\nline two"),
    ];

    let responses = client.send_requests(requests).unwrap();

    let empty = echo(&responses[0]);
    assert_eq!(empty.method, "POST");
    assert_eq!(empty.body, "");
    let full = echo(&responses[1]);
    assert_eq!(full.body, "line one\nline two");
    assert_eq!(full.header_values("content-length"), ["17"]);
}

#[test]
fn batch_results_are_in_input_order() {
    let base = start_server();
    let client = Client::new(ClientConfig::default().with_batch_size(2));
    let requests = vec![
        HttpRequest::new("GET", format!("{base}/delay/200/a")),
        HttpRequest::new("GET", format!("{base}/delay/0/b")),
        HttpRequest::new("GET", format!("{base}/delay/200/c")),
        HttpRequest::new("GET", format!("{base}/delay/0/d")),
        HttpRequest::new("GET", format!("{base}/delay/0/e")),
    ];

    let responses = client.send_requests(requests).unwrap();

    let bodies: Vec<String> = responses.iter().map(|r| r.body().text().into_owned()).collect();
    assert_eq!(bodies, ["a", "b", "c", "d", "e"]);
    assert_eq!(completions(&base), ["b", "a", "d", "c", "e"]);
}

#[test]
fn batch_members_run_concurrently() {
    let base = start_server();
    let client = Client::new(ClientConfig::default());
    let requests: Vec<_> = (0..5)
        .map(|i| HttpRequest::new("GET", format!("{base}/delay/300/r{i}")))
        .collect();

    let started = std::time::Instant::now();
    let responses = client.send_requests_with(requests, 5).unwrap();

    assert_eq!(responses.len(), 5);
    assert!(started.elapsed() < Duration::from_millis(1200), "{:?}", started.elapsed());
}

#[test]
fn error_status_is_a_response_not_a_failure() {
    let base = start_server();

    let resp = Client::new(ClientConfig::default())
        .send_request(HttpRequest::new("DELETE", format!("{base}/status/404")))
        .unwrap();

    assert_eq!(resp.status(), 404);
    assert_eq!(resp.reason(), "Not Found");
    assert!(!resp.is_success());
    assert_eq!(resp.body().text(), "status 404");
}

#[test]
fn redirects_are_followed_by_default() {
    let base = start_server();

    let resp = Client::new(ClientConfig::default())
        .send_request(HttpRequest::new("POST", format!("{base}/redirect/3")).with_body("x"))
        .unwrap();

    assert_eq!(resp.status(), 200);
    let seen = echo(&resp);
    assert_eq!(seen.path, "/echo");
    // 303 turns the follow-up into a body-less GET.
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.body, "");
}

#[test]
fn redirects_can_be_disabled() {
    let base = start_server();
    let config = ClientConfig::default().with_extra_option(OptionKey::FollowRedirects, false);

    let resp = Client::new(config)
        .send_request(HttpRequest::new("GET", format!("{base}/redirect/2")))
        .unwrap();

    assert_eq!(resp.status(), 303);
    assert_eq!(resp.header("location"), Some("/redirect/1"));
}

#[test]
fn too_many_redirects_fail() {
    let base = start_server();
    let config = ClientConfig::default().with_extra_option(OptionKey::MaxRedirects, 1u64);

    let err = Client::new(config)
        .send_request(HttpRequest::new("GET", format!("{base}/redirect/3")))
        .unwrap_err();

    let failure = err.transport_failure().unwrap();
    assert!(failure.message.contains("redirects"), "{}", failure.message);
    assert_eq!(failure.status, Some(303));
}

#[test]
fn include_head_prefixes_body_with_headers() {
    let base = start_server();
    let config = ClientConfig::default().with_extra_option(OptionKey::IncludeHead, true);

    let resp = Client::new(config)
        .send_request(HttpRequest::new("GET", format!("{base}/cookies")))
        .unwrap();

    let text = resp.body().text().into_owned();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.contains("set-cookie: session=abc\r\n"), "{text}");
    assert!(text.ends_with("\r\n\r\ntwo cookies"), "{text}");
}

#[test]
fn return_body_false_keeps_headers_only() {
    let base = start_server();
    let config = ClientConfig::default().with_extra_option(OptionKey::ReturnBody, false);

    let resp = Client::new(config)
        .send_request(HttpRequest::new("GET", format!("{base}/cookies")))
        .unwrap();

    assert!(resp.body().is_empty());
    assert_eq!(resp.headers().get_all("set-cookie").len(), 2);
}

#[test]
fn connection_refused_is_a_transport_failure() {
    let addr = closed_addr();

    let err = Client::new(ClientConfig::default())
        .send_request(HttpRequest::new("GET", format!("http://{addr}/echo")))
        .unwrap_err();

    let failure = err.transport_failure().unwrap();
    assert!(failure.message.contains("connect"), "{}", failure.message);
    assert_eq!(failure.status, None);
    assert_eq!(failure.request.uri(), format!("http://{addr}/echo"));
}

#[test]
fn one_unreachable_request_fails_the_batch() {
    let base = start_server();
    let addr = closed_addr();
    let requests = vec![
        HttpRequest::new("GET", format!("{base}/echo")),
        HttpRequest::new("GET", format!("http://{addr}/b")),
        HttpRequest::new("GET", format!("{base}/echo")),
    ];

    let err = Client::new(ClientConfig::default()).send_requests_with(requests, 2).unwrap_err();

    assert!(matches!(err, DispatchError::Transport(_)));
    assert_eq!(err.transport_failure().unwrap().request.uri(), format!("http://{addr}/b"));
}

#[test]
fn slow_response_hits_the_timeout() {
    let base = start_server();
    let config = ClientConfig::default().with_extra_option(OptionKey::Timeout, "100ms");

    let err = Client::new(config)
        .send_request(HttpRequest::new("GET", format!("{base}/delay/2000/slow")))
        .unwrap_err();

    assert!(err.to_string().contains("timed out"), "{err}");
}

#[test]
fn batch_deadline_stops_a_slow_batch() {
    let base = start_server();
    let config = ClientConfig::default().with_batch_deadline(Duration::from_millis(150));
    let requests = vec![
        HttpRequest::new("GET", format!("{base}/delay/0/fast")),
        HttpRequest::new("GET", format!("{base}/delay/2000/slow")),
    ];

    let client = Client::new(config);

    for _ in 0..5 {
        let err = client.send_requests(requests.clone()).unwrap_err();
        assert!(matches!(err, DispatchError::DeadlineElapsed(_)), "{err}");

        let err = client.send_requests_settled(requests.clone(), 2).unwrap_err();
        assert!(matches!(err, DispatchError::DeadlineElapsed(_)), "{err}");
    }
}

/// Serve one raw HTTP/1.1 response to the first connection and return the
/// server's base URL.
fn raw_server(response: &'static str) -> String {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream.write_all(response.as_bytes()).unwrap();
        let _ = stream.shutdown(std::net::Shutdown::Write);
        let _ = stream.read_to_end(&mut request);
    });
    format!("http://{addr}")
}

#[test]
fn server_reason_phrase_is_kept() {
    let base = raw_server(
        "HTTP/1.1 200 Everything Fine\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
    );
    let config = ClientConfig::default().with_extra_option(OptionKey::IncludeHead, true);

    let resp = Client::new(config)
        .send_request(HttpRequest::new("GET", format!("{base}/")))
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.reason(), "Everything Fine");
    let text = resp.body().text().into_owned();
    assert!(text.starts_with("HTTP/1.1 200 Everything Fine\r\n"), "{text}");
    assert!(text.ends_with("\r\n\r\nok"), "{text}");
}

#[test]
fn canonical_reason_is_used_when_server_sends_it() {
    let base = raw_server("HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");

    let resp = Client::new(ClientConfig::default())
        .send_request(HttpRequest::new("POST", format!("{base}/items")))
        .unwrap();

    assert_eq!(resp.status(), 201);
    assert_eq!(resp.reason(), "Created");
}

#[test]
fn cross_origin_redirect_does_not_replay_host() {
    let base = start_server();
    let location = format!("{base}/echo");
    let redirector = raw_server(Box::leak(
        format!(
            "HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        )
        .into_boxed_str(),
    ));
    let req = HttpRequest::new("POST", format!("{redirector}/form"))
        .with_header("Host", "origin.test")
        .with_header("Content-Type", "text/plain")
        .with_body("x=1");

    let resp = Client::new(ClientConfig::default()).send_request(req).unwrap();

    let seen = echo(&resp);
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.header_values("host"), [base.trim_start_matches("http://")]);
    assert!(seen.header_values("content-type").is_empty());
    assert_eq!(seen.body, "");
}

#[test]
fn request_builds_and_sends_post() {
    let base = start_server();
    let options = RequestOptions::new()
        .body("{}")
        .header("Content-Type", "application/json");

    let resp = Client::new(ClientConfig::default())
        .request("POST", &format!("{base}/echo"), options)
        .unwrap();

    let seen = echo(&resp);
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body, "{}");
    assert_eq!(seen.header_values("content-type"), ["application/json"]);
}

#[test]
fn matches_reference_client() {
    let base = start_server();
    let url = format!("{base}/cookies");

    let mut reference = ureq::get(&url).call().unwrap();
    let reference_cookies: Vec<String> = reference
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    let reference_status = reference.status().as_u16();
    let reference_body = reference.body_mut().read_to_string().unwrap();

    let resp = Client::new(ClientConfig::default())
        .send_request(HttpRequest::new("GET", url))
        .unwrap();

    assert_eq!(resp.status(), reference_status);
    assert_eq!(resp.headers().get_all("set-cookie"), reference_cookies.as_slice());
    assert_eq!(resp.body().text(), reference_body);
}
