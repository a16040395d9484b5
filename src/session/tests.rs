use super::*;
use std::time::Duration;
use wiremock::matchers::{any, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PAGE: &str = r#"<html><body>
<form method="post" action="/mailman/admin/eng">
<input type="password" name="adminpw">
<input type="submit" name="admlogin" value="Let me in...">
</form></body></html>"#;

const ADMIN_HOME: &str = "<html><body><h1>eng administration</h1></body></html>";

const ROSTER_PAGE: &str = r#"<html><body><ul>
<li><a href="../options/eng/bob--at--example.org">bob at example.org</a>
<li><a href="../options/eng/alice--at--corp.internal">alice at corp.internal</a>
</ul></body></html>"#;

fn backend(server: &MockServer) -> ListBackend {
    ListBackend {
        server_url: format!("{}/mailman", server.uri()),
        list_name: "eng".into(),
        alias: "eng".into(),
        password: "secret".into(),
        comment: "Engineering".into(),
        archive: None,
        internal_domains: vec![r"corp\.internal".into()],
    }
}

fn settings(dry_run: bool) -> ClientSettings {
    ClientSettings {
        options: Arc::new(RunOptions {
            dry_run,
            ..RunOptions::default()
        }),
        http: HttpConfig {
            timeout: Duration::from_secs(5),
            ..HttpConfig::default()
        },
        retry: RetryConfig::disabled(),
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mailman/admin/eng"))
        .and(body_string_contains("adminpw=secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "eng+admin=token; Path=/mailman")
                .set_body_string(ADMIN_HOME),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_roster(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/mailman/roster/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn connect_logs_in_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    assert_eq!(client.state().await, SessionState::Disconnected);

    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.state().await, SessionState::Connected);
}

#[tokio::test]
async fn concurrent_callers_share_one_login() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_roster(&server, ROSTER_PAGE).await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    let (a, b) = tokio::join!(client.try_fetch_roster(), client.try_fetch_roster());
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn rejected_password_fails_without_second_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mailman/admin/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();

    let first = client.connect().await.unwrap_err();
    assert!(matches!(first, Error::Auth { .. }));
    assert!(matches!(
        client.state().await,
        SessionState::Failed {
            kind: FailureKind::Auth,
            ..
        }
    ));

    // Later operations report the same failure class without network access
    assert!(matches!(
        client.try_fetch_roster().await,
        Err(Error::Auth { .. })
    ));
    assert!(matches!(
        client.subscribe(&["a@x.com".into()]).await,
        Err(Error::Auth { .. })
    ));
}

#[tokio::test]
async fn forbidden_login_is_an_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mailman/admin/eng"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("HTTP 401"), "{err}");
}

#[tokio::test]
async fn unreachable_server_moves_to_failed_transport() {
    let server = MockServer::start().await;
    let mut unreachable = backend(&server);
    // Nothing listens on port 9 (discard) in the test environment
    unreachable.server_url = "http://127.0.0.1:9/mailman".into();
    drop(server);

    let client = SessionClient::new(unreachable, &settings(false)).unwrap();
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
    assert!(matches!(
        client.state().await,
        SessionState::Failed {
            kind: FailureKind::Transport,
            ..
        }
    ));
}

#[tokio::test]
async fn roster_is_decoded_sorted_and_cached() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_roster(&server, ROSTER_PAGE).await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    let roster = client.fetch_roster().await;

    assert_eq!(
        roster.addresses(),
        ["alice@corp.internal", "bob@example.org"]
    );
    assert_eq!(client.roster().await, roster);
    assert!(!client.roster_is_stale().await);
}

#[tokio::test]
async fn failed_refresh_keeps_cached_roster() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/mailman/roster/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROSTER_PAGE))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mailman/roster/eng"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    assert_eq!(client.fetch_roster().await.len(), 2);

    let err = client.try_fetch_roster().await.unwrap_err();
    assert!(matches!(err, Error::Fetch { .. }));

    // The recovering variant returns nothing for this call only
    assert!(client.fetch_roster().await.is_empty());
    assert_eq!(client.roster().await.len(), 2);
}

#[tokio::test]
async fn server_errors_on_page_loads_are_retried() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/mailman/roster/eng"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_roster(&server, ROSTER_PAGE).await;

    let mut settings = settings(false);
    settings.retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    let client = SessionClient::new(backend(&server), &settings).unwrap();
    assert_eq!(client.try_fetch_roster().await.unwrap().len(), 2);
}

#[tokio::test]
async fn subscribe_submits_newline_joined_addresses() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng/members/add"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form method="post" action="add">
<input type="hidden" name="csrf_token" value="t0k">
<textarea name="subscribees"></textarea>
<input type="submit" name="setmemberopts_btn" value="Submit">
</form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mailman/admin/eng/members/add"))
        .and(body_string_contains("subscribees=a%40x.com%0Ab%40y.com"))
        .and(body_string_contains("csrf_token=t0k"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Successfully subscribed"))
        .expect(1)
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    let outcome = client
        .subscribe(&["a@x.com".into(), "b@y.com".into()])
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Succeeded);
    assert!(client.roster_is_stale().await);
}

#[tokio::test]
async fn dry_run_skips_the_mutation() {
    let server = MockServer::start().await;
    // Nothing may be requested at all, not even the login page
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(true)).unwrap();
    let outcome = client.unsubscribe(&["a@x.com".into()]).await.unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(
        client.set_welcome_message("hi").await.unwrap(),
        Outcome::Skipped
    );

    assert_eq!(client.state().await, SessionState::Disconnected);
    assert!(!client.roster_is_stale().await);
}

#[tokio::test]
async fn login_form_served_with_401_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng"))
        .respond_with(ResponseTemplate::new(401).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mailman/admin/eng"))
        .and(body_string_contains("adminpw=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ADMIN_HOME))
        .expect(1)
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.state().await, SessionState::Connected);
}

#[tokio::test]
async fn entry_page_401_without_login_form_is_an_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::Auth { .. }), "{err}");
}

#[tokio::test]
async fn roster_is_unconfirmed_when_refresh_after_change_fails() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/mailman/roster/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROSTER_PAGE))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mailman/roster/eng"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng/members/remove"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form method="post" action="remove">
<textarea name="unsubscribees"></textarea>
<input type="submit" name="setmemberopts_btn" value="Submit">
</form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mailman/admin/eng/members/remove"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    assert_eq!(client.confirmed_roster().await.unwrap().len(), 2);

    client.unsubscribe(&["bob@example.org".into()]).await.unwrap();
    assert!(client.roster_is_stale().await);
    assert_eq!(client.confirmed_roster().await, None);
    // The stale cache is still there for callers that accept it
    assert_eq!(client.roster().await.len(), 2);
}

#[tokio::test]
async fn roster_is_unconfirmed_when_never_loaded() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/mailman/roster/eng"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    assert_eq!(client.confirmed_roster().await, None);
}

#[tokio::test]
async fn empty_address_list_is_a_no_op() {
    let server = MockServer::start().await;
    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();

    assert_eq!(client.subscribe(&[]).await.unwrap(), Outcome::Succeeded);
    assert_eq!(client.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn missing_form_field_is_a_schema_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng/members/add"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<form><input name=other></form>"),
        )
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    let err = client.subscribe(&["a@x.com".into()]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Form(crate::error::FormError::MissingField { .. })
    ));
}

#[tokio::test]
async fn templates_are_read_and_written() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/mailman/admin/eng/"))
        .and(query_param("VARHELP", "general/goodbye_msg"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form method="post" action="/mailman/admin/eng/general">
<textarea name="goodbye_msg">
So long &amp; thanks</textarea>
<input type="submit" name="submit" value="Submit">
</form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mailman/admin/eng/general"))
        .and(body_string_contains("goodbye_msg=Bye"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = SessionClient::new(backend(&server), &settings(false)).unwrap();
    assert_eq!(client.goodbye_message().await.unwrap(), "So long & thanks");
    assert_eq!(
        client.set_goodbye_message("Bye").await.unwrap(),
        Outcome::Succeeded
    );
}

#[test]
fn classification_uses_backend_patterns() {
    let backend = ListBackend {
        server_url: "http://localhost".into(),
        list_name: "eng".into(),
        alias: "eng".into(),
        password: String::new(),
        comment: String::new(),
        archive: None,
        internal_domains: vec![r"corp\.internal".into()],
    };
    let client = SessionClient::new(backend, &ClientSettings::default()).unwrap();

    assert_eq!(client.classify("a@corp.internal"), Classification::Internal);
    assert_eq!(client.classify("a@external.com"), Classification::External);
    assert_eq!(
        client.domains_of(["b@y.com", "a@x.com", "c@y.com"]),
        ["x.com", "y.com"]
    );
}
