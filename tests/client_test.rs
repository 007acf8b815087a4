use env_logger::{Builder, Env};
use mpclassify::{
    ApiClient, CategorySelector, ClientConfig, ClientError, CorrectionRequest, Marketplace, NewUser,
    Prediction, Role, SelectorError, SelectorState, Session, SessionStore,
};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

// Initialize test logger
fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// A request as seen by the stub server
#[derive(Debug, Clone)]
struct Recorded {
    head: String,
    body: String,
}

impl Recorded {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

type RequestLog = Arc<StdMutex<Vec<Recorded>>>;

/// Serves the canned `(status, body)` responses in order, one connection
/// each, and records every request it receives.
async fn stub_server(responses: Vec<(u16, &'static str)>) -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(StdMutex::new(Vec::new()));
    let server_log = Arc::clone(&log);

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            server_log.lock().unwrap().push(request);
            let response = format!(
                "HTTP/1.1 {} Stub\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}/api", addr), log)
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let recorded = Recorded {
        head,
        body: String::new(),
    };
    let content_length = recorded
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok());
    let chunked = recorded
        .header("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    loop {
        let complete = match content_length {
            Some(len) => buf.len() >= header_end + len,
            None if chunked => buf.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
        ..recorded
    }
}

fn session(role: Role) -> Session {
    Session {
        token: "token-123".into(),
        username: "alice".into(),
        role,
    }
}

fn client(base_url: &str, store: SessionStore) -> (ApiClient, Arc<Mutex<SessionStore>>) {
    let config = ClientConfig::default()
        .with_api_url(base_url)
        .with_timeout(Duration::from_secs(5));
    let store = Arc::new(Mutex::new(store));
    let client = ApiClient::new(config, Arc::clone(&store)).unwrap();
    (client, store)
}

fn logged_in(role: Role) -> SessionStore {
    let mut store = SessionStore::in_memory();
    store.set(session(role)).unwrap();
    store
}

const LOGIN_OK: &str =
    r#"{"token": "fresh-token", "user": {"id": 7, "username": "bob", "role": "user"}}"#;
const PREDICTION: &str = r#"{"product_name": "iphone 14", "marketplace": "ozon",
    "category": "Smartphones", "category_path": "Electronics/Phones/Smartphones",
    "hierarchy": ["Electronics", "Phones", "Smartphones"], "confidence": 0.91,
    "top_3": [{"category": "Electronics/Phones/Smartphones", "confidence": 0.91}]}"#;
const TAXONOMY: &str = r#"{"marketplace": "ozon", "categories": [
    {"id": null, "name": "Electronics", "parent": null, "children": ["Phones"],
     "level": 0, "full_path": "Electronics"},
    {"id": null, "name": "Phones", "parent": "Electronics", "children": ["Smartphones"],
     "level": 1, "full_path": "Electronics/Phones"},
    {"id": "12", "name": "Smartphones", "parent": "Phones", "children": [],
     "level": 2, "full_path": "Electronics/Phones/Smartphones"}
]}"#;

#[tokio::test]
async fn test_login_then_bearer_on_every_call() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let (base, log) = stub_server(vec![(200, LOGIN_OK), (200, PREDICTION)]).await;
    let (client, store) = client(&base, SessionStore::in_memory());

    let session = client.login("bob", "secret1").await?;
    assert_eq!(session.token, "fresh-token");
    assert_eq!(session.role, Role::User);
    assert_eq!(store.lock().await.username(), Some("bob"));

    let prediction = client.predict("  iphone 14  ", Marketplace::Ozon).await?;
    assert_eq!(prediction.category, "Smartphones");
    assert_eq!(prediction.marketplace, Some(Marketplace::Ozon));

    let requests = log.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].request_line().starts_with("POST /api/auth/login"));
    assert!(requests[0].header("authorization").is_none());
    assert!(requests[0].body.contains("\"username\":\"bob\""));

    assert!(requests[1].request_line().starts_with("POST /api/predict_category"));
    assert_eq!(requests[1].header("authorization").as_deref(), Some("Bearer fresh-token"));
    assert!(requests[1].body.contains("\"product_name\":\"iphone 14\""));
    assert!(requests[1].body.contains("\"marketplace\":\"ozon\""));
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_clears_session() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let mut file_store = SessionStore::open(&path)?;
    file_store.set(session(Role::Admin))?;

    let (base, _log) = stub_server(vec![(401, r#"{"msg": "Token has expired"}"#)]).await;
    let (client, store) = client(&base, file_store);

    let err = client.category_tree(Marketplace::Wildberries).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized));
    assert!(store.lock().await.get().is_none());
    assert!(!path.exists());

    // Everything after that needs a new login
    let err = client.predict("kettle", Marketplace::Wildberries).await.unwrap_err();
    assert!(matches!(err, ClientError::NotLoggedIn));
    Ok(())
}

#[tokio::test]
async fn test_rejected_login() {
    init();
    let (base, _log) =
        stub_server(vec![(401, r#"{"error": "Incorrect data or user not found"}"#)]).await;
    let (client, store) = client(&base, SessionStore::in_memory());

    let err = client.login("bob", "wrong").await.unwrap_err();
    match err {
        ClientError::InvalidCredentials(message) => {
            assert_eq!(message, "Incorrect data or user not found")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.lock().await.get().is_none());
}

#[tokio::test]
async fn test_server_error_message_is_surfaced() {
    init();
    let (base, _log) =
        stub_server(vec![(400, r#"{"error": "Only CSV files are supported"}"#)]).await;
    let (client, _store) = client(&base, logged_in(Role::User));

    let err = client.predict("kettle", Marketplace::Ozon).await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Only CSV files are supported");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_local_checks_do_not_hit_the_server() {
    init();
    // Nothing listens here; any request would fail with an HTTP error
    let base = "http://127.0.0.1:9/api";

    let (anonymous, _) = client(base, SessionStore::in_memory());
    assert!(matches!(
        anonymous.predict("kettle", Marketplace::Ozon).await,
        Err(ClientError::NotLoggedIn)
    ));
    assert!(matches!(
        anonymous.predict("   ", Marketplace::Ozon).await,
        Err(ClientError::Validation(_))
    ));

    let (user, _) = client(base, logged_in(Role::User));
    assert!(matches!(user.list_users().await, Err(ClientError::Forbidden)));
    assert!(matches!(user.delete_user(3).await, Err(ClientError::Forbidden)));
    assert!(matches!(
        user.predict_file(std::path::Path::new("products.xlsx"), Marketplace::Ozon).await,
        Err(ClientError::Validation(_))
    ));

    let (admin, _) = client(base, logged_in(Role::Admin));
    let weak = NewUser::new("carol", "123", Role::User);
    assert!(matches!(admin.register(&weak).await, Err(ClientError::Validation(_))));
}

#[tokio::test]
async fn test_admin_user_management() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let (base, log) = stub_server(vec![
        (201, r#"{"message": "User carol registered"}"#),
        (200, r#"{"users": [{"id": 1, "username": "alice", "role": "admin", "created_at": null},
                             {"id": 2, "username": "carol", "role": "user"}]}"#),
        (200, r#"{"message": "User carol deleted"}"#),
    ])
    .await;
    let (client, _store) = client(&base, logged_in(Role::Admin));

    let message = client
        .register(&NewUser::new("carol", "secret1", Role::User))
        .await?;
    assert_eq!(message, "User carol registered");

    let users = client.list_users().await?;
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].role, Role::Admin);
    assert_eq!(users[1].username, "carol");

    client.delete_user(2).await?;

    let requests = log.lock().unwrap().clone();
    assert!(requests[0].body.contains("\"role\":\"user\""));
    assert!(!requests[0].body.contains("confirm"));
    assert!(requests[1].request_line().starts_with("GET /api/users "));
    assert!(requests[2].request_line().starts_with("DELETE /api/users/2 "));
    Ok(())
}

#[tokio::test]
async fn test_selector_against_server() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let (base, log) = stub_server(vec![(200, TAXONOMY)]).await;
    let (client, _store) = client(&base, logged_in(Role::User));

    let mut selector = CategorySelector::new(Marketplace::Ozon, "iphone 14");
    assert_eq!(selector.activate(&client).await?, SelectorState::Ready);
    assert_eq!(selector.rows().len(), 3);
    selector.select_row(2)?;
    assert_eq!(
        selector.chosen_category().as_deref(),
        Some("Electronics/Phones/Smartphones")
    );

    let requests = log.lock().unwrap().clone();
    assert!(requests[0]
        .request_line()
        .starts_with("GET /api/categories/tree?marketplace=ozon"));
    Ok(())
}

#[tokio::test]
async fn test_selector_degrades_when_server_fails() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let (base, _log) = stub_server(vec![(404, r#"{"error": "Dataset for ozon not found"}"#)]).await;
    let (client, _store) = client(&base, logged_in(Role::User));

    let mut selector = CategorySelector::new(Marketplace::Ozon, "iphone 14");
    assert_eq!(selector.activate(&client).await?, SelectorState::LoadFailed);
    assert!(selector.load_error().unwrap().contains("Dataset for ozon not found"));

    selector.set_manual_text("Electronics/Phones")?;
    assert!(selector.can_save());
    Ok(())
}

#[tokio::test]
async fn test_submit_correction() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let (base, log) = stub_server(vec![(
        200,
        r#"{"message": "Correction saved", "correction_id": 4,
            "note": "4/10 corrections collected"}"#,
    )])
    .await;
    let (client, _store) = client(&base, logged_in(Role::User));

    let prediction: Prediction = serde_json::from_str(PREDICTION)?;
    let request = CorrectionRequest::from_prediction(
        &prediction,
        Marketplace::Wildberries,
        "Electronics/Phones",
    );
    let receipt = client.submit_correction(&request).await?;
    assert_eq!(receipt.correction_id, Some(4));
    assert_eq!(receipt.note.as_deref(), Some("4/10 corrections collected"));

    let requests = log.lock().unwrap().clone();
    let body: serde_json::Value = serde_json::from_str(&requests[0].body)?;
    assert_eq!(body["marketplace"], "ozon");
    assert_eq!(body["predicted_category"], "Smartphones");
    assert_eq!(body["corrected_category"], "Electronics/Phones");
    Ok(())
}

#[tokio::test]
async fn test_batch_confidence_is_normalised() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let (base, log) = stub_server(vec![(
        200,
        r#"{"marketplace": "wildberries", "total": 2, "success": 1, "results": [
            {"product_name": "kettle", "category": "Kettles", "category_path": "Home/Kettles",
             "hierarchy": ["Home", "Kettles"], "confidence": 87.5, "top_3": []},
            {"product_name": "???", "category": "Error", "confidence": 0, "top_3": [],
             "error": "empty vector"}
        ]}"#,
    )])
    .await;
    let (client, _store) = client(&base, logged_in(Role::User));

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("products.csv");
    std::fs::write(&path, "product_name\nkettle\n???\n")?;

    let batch = client.predict_file(&path, Marketplace::Wildberries).await?;
    assert_eq!(batch.total, 2);
    assert!((batch.results[0].confidence - 0.875).abs() < 1e-9);
    assert_eq!(batch.results[0].marketplace, Some(Marketplace::Wildberries));
    assert!(batch.results[1].is_error());

    let requests = log.lock().unwrap().clone();
    assert!(requests[0]
        .header("content-type")
        .unwrap_or_default()
        .starts_with("multipart/form-data"));
    assert!(requests[0].body.contains("filename=\"products.csv\""));
    assert!(requests[0].body.contains("wildberries"));
    Ok(())
}

#[tokio::test]
async fn test_selector_stops_when_session_expires() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let (base, log) = stub_server(vec![(401, r#"{"msg": "Token has expired"}"#)]).await;
    let (client, store) = client(&base, logged_in(Role::User));

    let mut selector = CategorySelector::new(Marketplace::Ozon, "iphone 14");
    let err = selector.activate(&client).await.unwrap_err();
    assert_eq!(err, SelectorError::LoginRequired);
    assert_eq!(selector.state(), SelectorState::Closed);
    assert!(selector.set_manual_text("Electronics/Phones").is_err());

    assert!(store.lock().await.get().is_none());
    assert!(!client.is_logged_in().await);
    assert_eq!(log.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_selector_without_session_never_fetches() {
    init();
    let (client, _store) = client("http://127.0.0.1:9/api", SessionStore::in_memory());

    let mut selector = CategorySelector::new(Marketplace::Wildberries, "kettle");
    assert_eq!(
        selector.activate(&client).await,
        Err(SelectorError::LoginRequired)
    );
    assert!(!selector.is_manual_mode());
}
