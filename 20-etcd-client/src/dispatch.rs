//! Request dispatch with member failover.
//!
//! One call runs one sequential loop of attempts:
//!
//! - **network failure**: charge the retry budget, rotate the leader hint to
//!   `machines[retry % len]`, back off, try again
//! - **307**: adopt the `Location` as leader hint and go there immediately,
//!   without charging the budget
//! - **500**: charge the budget and try again at once
//! - **anything else**: terminal, decode the body
//!
//! Network failures and 500s share one budget of `2 * members` retries, so a
//! cluster flapping between the two cannot keep a caller spinning.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::cluster::Cluster;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::request::KeyRequest;
use crate::response::{decode_failure, decode_success, KeyResponse};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Retries left for one call, shared by network failures and 500s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    retries: usize,
    ceiling: usize,
}

impl RetryBudget {
    pub fn for_members(members: usize) -> Self {
        Self {
            retries: 0,
            ceiling: 2 * members,
        }
    }

    /// Records one failed attempt and returns the new retry count.
    ///
    /// Fails once the count exceeds `2 * members`.
    pub fn charge(&mut self) -> Result<usize> {
        self.retries += 1;
        if self.retries > self.ceiling {
            return Err(Error::Unreachable {
                retries: self.retries,
            });
        }
        Ok(self.retries)
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// Where the next attempt goes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Path relative to the API root of the current leader hint.
    Leader,
    /// Fully resolved URL, e.g. a redirect target.
    Absolute(String),
}

impl Target {
    fn for_path(path: &str) -> Self {
        match Url::parse(path) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Target::Absolute(path.into()),
            _ => Target::Leader,
        }
    }
}

/// Classified result of one request/response cycle.
#[derive(Debug)]
enum Attempt {
    NetworkError(TransportError),
    Redirected(Option<String>),
    ServerError,
    Terminal(HttpResponse),
}

impl Attempt {
    fn classify(outcome: std::result::Result<HttpResponse, TransportError>) -> Self {
        match outcome {
            Err(err) => Attempt::NetworkError(err),
            Ok(response) => match response.status {
                StatusCode::TEMPORARY_REDIRECT => Attempt::Redirected(response.location),
                StatusCode::INTERNAL_SERVER_ERROR => Attempt::ServerError,
                _ => Attempt::Terminal(response),
            },
        }
    }
}

pub struct Dispatcher<T> {
    cluster: Arc<Cluster>,
    transport: T,
    backoff: Duration,
    max_redirects: usize,
    deadline: Option<Duration>,
    api_version: String,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(cluster: Arc<Cluster>, transport: T, config: &ClientConfig) -> Self {
        Self {
            cluster,
            transport,
            backoff: config.backoff,
            max_redirects: config.max_redirects,
            deadline: config.deadline,
            api_version: config.api_version.clone(),
        }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request` until it reaches a terminal response or runs out of
    /// retries, then decodes the outcome.
    pub async fn dispatch(&self, request: &KeyRequest) -> Result<KeyResponse> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run(request))
                .await
                .map_err(|_| Error::DeadlineExceeded(deadline))?,
            None => self.run(request).await,
        }
    }

    async fn run(&self, request: &KeyRequest) -> Result<KeyResponse> {
        let mut budget = RetryBudget::for_members(self.cluster.len());
        let mut redirects = 0usize;
        let mut target = Target::for_path(request.path());

        loop {
            let url = self.resolve(&target, request.path());
            debug!(method = %request.method(), url = %url, "send request");

            let outcome = self
                .transport
                .send(HttpRequest {
                    method: request.method().clone(),
                    url: url.clone(),
                    body: request.body().map(str::to_string),
                })
                .await;

            match Attempt::classify(outcome) {
                Attempt::NetworkError(err) => {
                    warn!(
                        url = %url,
                        error = %err,
                        retry = budget.retries() + 1,
                        "network failure"
                    );
                    let retry = budget.charge()?;
                    self.cluster.rotate(retry);
                    target = Target::for_path(request.path());
                    tokio::time::sleep(self.backoff).await;
                }
                Attempt::Redirected(location) => {
                    let (location, next) = resolve_location(&url, location)?;
                    redirects += 1;
                    if redirects > self.max_redirects {
                        return Err(Error::TooManyRedirects { hops: redirects });
                    }
                    debug!(from = %url, to = %next, "follow redirect");
                    self.cluster.adopt_leader_hint(&location);
                    target = Target::Absolute(next);
                }
                Attempt::ServerError => {
                    warn!(url = %url, retry = budget.retries() + 1, "server error");
                    budget.charge()?;
                }
                Attempt::Terminal(response) => {
                    debug!(url = %url, status = %response.status, "received response");
                    return finish(response);
                }
            }
        }
    }

    fn resolve(&self, target: &Target, path: &str) -> String {
        match target {
            Target::Absolute(url) => url.clone(),
            Target::Leader => format!("{}/{}/{}", self.cluster.leader(), self.api_version, path),
        }
    }
}

/// Parses a redirect target and returns it along with the URL to request
/// next. An absolute location is requested exactly as sent; a relative one
/// is resolved against the URL that produced the redirect.
fn resolve_location(current: &str, location: Option<String>) -> Result<(Url, String)> {
    let location = location
        .filter(|location| !location.trim().is_empty())
        .ok_or(Error::MissingRedirectLocation)?;
    if let Ok(absolute) = Url::parse(&location) {
        return Ok((absolute, location));
    }
    let joined = Url::parse(current)
        .and_then(|base| base.join(&location))
        .map_err(|_| Error::MissingRedirectLocation)?;
    let next = joined.to_string();
    Ok((joined, next))
}

fn finish(response: HttpResponse) -> Result<KeyResponse> {
    let body = response.body.map_err(Error::Body)?;
    if response.status != StatusCode::OK {
        return Err(decode_failure(response.status, &body));
    }
    decode_success(&body)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::Method;
    use tokio::time::Instant;

    use super::*;
    use crate::config::DEFAULT_BACKOFF;
    use crate::options::Options;
    use crate::transport::FORM_CONTENT_TYPE;

    const GET_FOO: &[u8] =
        br#"{"action":"get","node":{"key":"/foo","value":"bar","modifiedIndex":5}}"#;

    enum Scripted {
        Fail,
        Respond(HttpResponse),
    }

    #[derive(Debug, Clone)]
    struct Sent {
        url: String,
        content_type: Option<&'static str>,
        at: Instant,
    }

    /// Plays back canned outcomes; once the script runs out every request
    /// fails at the network level.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        sent: Mutex<Vec<Sent>>,
    }

    impl ScriptedTransport {
        fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                sent: Mutex::default(),
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn urls(&self) -> Vec<String> {
            self.sent().into_iter().map(|sent| sent.url).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push(Sent {
                url: request.url.clone(),
                content_type: request.content_type(),
                at: Instant::now(),
            });
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Respond(response)) => Ok(response),
                Some(Scripted::Fail) | None => Err(TransportError::new("connection refused")),
            }
        }
    }

    fn ok(body: &[u8]) -> Scripted {
        Scripted::Respond(HttpResponse::new(StatusCode::OK, body.to_vec()))
    }

    fn status(code: StatusCode) -> Scripted {
        Scripted::Respond(HttpResponse::new(code, Vec::new()))
    }

    fn dispatcher(
        members: usize,
        script: impl IntoIterator<Item = Scripted>,
    ) -> Dispatcher<ScriptedTransport> {
        dispatcher_with(members, script, ClientConfig::default())
    }

    fn dispatcher_with(
        members: usize,
        script: impl IntoIterator<Item = Scripted>,
        config: ClientConfig,
    ) -> Dispatcher<ScriptedTransport> {
        let machines: Vec<String> = (1..=members).map(|i| format!("http://m{i}:4001")).collect();
        let cluster = Arc::new(Cluster::new(&machines).unwrap());
        Dispatcher::new(cluster, ScriptedTransport::new(script), &config)
    }

    fn get_foo() -> KeyRequest {
        KeyRequest::get("/foo", &Options::new()).unwrap()
    }

    #[test]
    fn budget_allows_twice_the_members() {
        let mut budget = RetryBudget::for_members(3);
        for expected in 1..=6 {
            assert_eq!(budget.charge().unwrap(), expected);
        }
        assert!(matches!(budget.charge(), Err(Error::Unreachable { retries: 7 })));
        assert_eq!(budget.ceiling(), 6);
    }

    #[test]
    fn absolute_paths_bypass_the_leader() {
        assert_eq!(
            Target::for_path("http://m2/v2/keys/foo"),
            Target::Absolute("http://m2/v2/keys/foo".into())
        );
        assert_eq!(Target::for_path("keys/foo"), Target::Leader);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_goes_to_leader() {
        let dispatcher = dispatcher(3, [ok(GET_FOO)]);
        let response = dispatcher.dispatch(&get_foo()).await.unwrap();

        assert_eq!(response.value(), Some("bar"));
        assert_eq!(dispatcher.transport().urls(), vec!["http://m1:4001/v2/keys/foo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_exhaust_budget_and_rotate() {
        let dispatcher = dispatcher(3, Vec::<Scripted>::new());
        let started = Instant::now();

        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();
        assert!(matches!(err, Error::Unreachable { retries: 7 }));

        // Initial attempt plus one retry per unit of the 2N budget.
        let urls = dispatcher.transport().urls();
        assert_eq!(
            urls,
            vec![
                "http://m1:4001/v2/keys/foo",
                "http://m2:4001/v2/keys/foo",
                "http://m3:4001/v2/keys/foo",
                "http://m1:4001/v2/keys/foo",
                "http://m2:4001/v2/keys/foo",
                "http://m3:4001/v2/keys/foo",
                "http://m1:4001/v2/keys/foo",
            ]
        );
        // One backoff between consecutive attempts, none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_BACKOFF * 6, "slept {elapsed:?}");
        assert!(elapsed < DEFAULT_BACKOFF * 7, "slept {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_backs_off_before_next_attempt() {
        let dispatcher = dispatcher(2, [Scripted::Fail, ok(GET_FOO)]);
        dispatcher.dispatch(&get_foo()).await.unwrap();

        let sent = dispatcher.transport().sent();
        assert_eq!(sent.len(), 2);
        let pause = sent[1].at - sent[0].at;
        assert!(pause >= Duration::from_millis(200), "paused {pause:?}");
        assert!(pause < Duration::from_millis(250), "paused {pause:?}");
        assert_eq!(dispatcher.cluster().leader(), "http://m2:4001");
    }

    #[tokio::test(start_paused = true)]
    async fn single_member_gets_two_retries() {
        let dispatcher = dispatcher(1, Vec::<Scripted>::new());
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();
        assert!(matches!(err, Error::Unreachable { retries: 3 }));
        assert_eq!(dispatcher.transport().sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_targets_location_verbatim() {
        let dispatcher = dispatcher(
            3,
            [
                Scripted::Respond(HttpResponse::redirect("http://m2/v2/keys/foo")),
                ok(GET_FOO),
            ],
        );
        let started = Instant::now();

        dispatcher.dispatch(&get_foo()).await.unwrap();

        assert_eq!(
            dispatcher.transport().urls(),
            vec!["http://m1:4001/v2/keys/foo", "http://m2/v2/keys/foo"]
        );
        assert_eq!(dispatcher.cluster().leader(), "http://m2");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_does_not_charge_budget() {
        // One failure, then a redirect, then failures until exhaustion: the
        // redirect adds an attempt on top of the usual 2N + 1.
        let dispatcher = dispatcher(
            3,
            [
                Scripted::Fail,
                Scripted::Respond(HttpResponse::redirect("http://m3:4001/v2/keys/foo")),
            ],
        );
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        // Seven charged failures, eight requests on the wire.
        assert!(matches!(err, Error::Unreachable { retries: 7 }));
        let urls = dispatcher.transport().urls();
        assert_eq!(urls.len(), 8);
        assert_eq!(urls[1], "http://m2:4001/v2/keys/foo");
        assert_eq!(urls[2], "http://m3:4001/v2/keys/foo");
        // After a network failure the logical path is resolved again.
        assert_eq!(urls[3], "http://m3:4001/v2/keys/foo");
    }

    #[tokio::test(start_paused = true)]
    async fn absolute_redirect_is_not_normalized() {
        let dispatcher = dispatcher(
            2,
            [
                Scripted::Respond(HttpResponse::redirect("HTTP://M2:80/v2/keys/foo")),
                ok(GET_FOO),
            ],
        );
        dispatcher.dispatch(&get_foo()).await.unwrap();

        assert_eq!(dispatcher.transport().urls()[1], "HTTP://M2:80/v2/keys/foo");
        assert_eq!(dispatcher.cluster().leader(), "http://m2");
    }

    #[tokio::test(start_paused = true)]
    async fn relative_redirect_resolves_against_current_url() {
        let dispatcher = dispatcher(
            2,
            [
                Scripted::Respond(HttpResponse::redirect("/v2/keys/foo?consistent=true")),
                ok(GET_FOO),
            ],
        );
        dispatcher.dispatch(&get_foo()).await.unwrap();
        assert_eq!(
            dispatcher.transport().urls()[1],
            "http://m1:4001/v2/keys/foo?consistent=true"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_without_location_is_terminal() {
        let dispatcher = dispatcher(3, [status(StatusCode::TEMPORARY_REDIRECT), ok(GET_FOO)]);
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        assert!(matches!(err, Error::MissingRedirectLocation));
        assert_eq!(dispatcher.transport().sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_loop_is_bounded() {
        let looping = (0..10).map(|i| {
            let location = format!("http://m{}:4001/v2/keys/foo", i % 2 + 1);
            Scripted::Respond(HttpResponse::redirect(location))
        });
        let dispatcher = dispatcher_with(2, looping, ClientConfig::default().max_redirects(3));
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        assert!(matches!(err, Error::TooManyRedirects { hops: 4 }));
        assert_eq!(dispatcher.transport().sent().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_retry_without_sleeping() {
        let dispatcher = dispatcher(
            3,
            [
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
                ok(GET_FOO),
            ],
        );
        let started = Instant::now();

        let response = dispatcher.dispatch(&get_foo()).await.unwrap();

        assert_eq!(response.index(), Some(5));
        assert_eq!(dispatcher.transport().sent().len(), 3);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_exhaust_budget() {
        let dispatcher = dispatcher(2, (0..10).map(|_| status(StatusCode::INTERNAL_SERVER_ERROR)));
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        assert!(matches!(err, Error::Unreachable { retries: 5 }));
        assert_eq!(dispatcher.transport().sent().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn network_and_server_errors_share_budget() {
        let flapping = (0..10).map(|i| {
            if i % 2 == 0 {
                Scripted::Fail
            } else {
                status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        });
        let dispatcher = dispatcher(2, flapping);
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        assert!(matches!(err, Error::Unreachable { retries: 5 }));
        assert_eq!(dispatcher.transport().sent().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn store_errors_are_returned_immediately() {
        let body = br#"{"errorCode":100,"message":"Key not found","cause":"/foo","index":5}"#;
        let dispatcher = dispatcher(
            3,
            [Scripted::Respond(HttpResponse::new(StatusCode::NOT_FOUND, body.to_vec()))],
        );
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        assert!(err.is_remote_rejected());
        assert_eq!(err.error_code(), Some(100));
        assert_eq!(dispatcher.transport().sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_success_is_malformed() {
        let dispatcher = dispatcher(1, [ok(b"not json")]);
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(dispatcher.transport().sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn body_read_failure_is_not_retried() {
        let broken = HttpResponse {
            status: StatusCode::OK,
            location: None,
            body: Err(TransportError::new("connection reset")),
        };
        let dispatcher = dispatcher(3, [Scripted::Respond(broken)]);
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        assert!(matches!(err, Error::Body(_)));
        assert_eq!(dispatcher.transport().sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn form_bodies_carry_content_type() {
        let put = KeyRequest::put("/foo", "bar", None, &Options::new()).unwrap();
        let dispatcher = dispatcher(1, [ok(GET_FOO), ok(GET_FOO)]);

        dispatcher.dispatch(&put).await.unwrap();
        dispatcher.dispatch(&get_foo()).await.unwrap();

        let sent = dispatcher.transport().sent();
        assert_eq!(sent[0].content_type, Some(FORM_CONTENT_TYPE));
        assert_eq!(sent[1].content_type, None);
    }

    #[tokio::test(start_paused = true)]
    async fn absolute_request_path_is_used_verbatim() {
        let request = KeyRequest::raw(Method::GET, "http://elsewhere:4001/v2/keys/foo", None);
        let dispatcher = dispatcher(2, [ok(GET_FOO)]);
        dispatcher.dispatch(&request).await.unwrap();
        assert_eq!(dispatcher.transport().urls(), vec!["http://elsewhere:4001/v2/keys/foo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_retries_short() {
        let config = ClientConfig::default().deadline(Duration::from_millis(500));
        let dispatcher = dispatcher_with(3, Vec::<Scripted>::new(), config);
        let err = dispatcher.dispatch(&get_foo()).await.unwrap_err();

        assert!(matches!(err, Error::DeadlineExceeded(_)));
        assert!(dispatcher.transport().sent().len() < 7);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_resets_per_call() {
        let script = [
            Scripted::Fail,
            Scripted::Fail,
            ok(GET_FOO),
            Scripted::Fail,
            Scripted::Fail,
            ok(GET_FOO),
        ];
        let dispatcher = dispatcher(1, script);
        dispatcher.dispatch(&get_foo()).await.unwrap();
        dispatcher.dispatch(&get_foo()).await.unwrap();
        assert_eq!(dispatcher.transport().sent().len(), 6);
    }
}
