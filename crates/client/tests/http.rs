#![forbid(unsafe_code)]

use rh_client::{ApiErrorKind, Backend, ClientConfig, HttpBackend};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One request as the server saw it. `head` is lowercased.
#[derive(Clone, Debug)]
struct Captured {
    request_line: String,
    head: String,
    body: Value,
}

type Log = Arc<Mutex<Vec<Captured>>>;

/// Serves `replies` in order, one connection each, and records every request.
async fn start_test_server(replies: Vec<(u16, Value)>) -> (HttpBackend, Log) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let seen = log.clone();
    tokio::spawn(async move {
        for (status, body) in replies {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            serve_one(stream, status, &body, &seen).await;
        }
    });

    let config = ClientConfig {
        api_base: format!("http://{addr}/api"),
        api_token: Some("test-token".to_string()),
        ..ClientConfig::default()
    };
    (HttpBackend::new(&config).expect("backend"), log)
}

async fn serve_one(mut stream: TcpStream, status: u16, reply: &Value, log: &Mutex<Vec<Captured>>) {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.expect("read request");
        if n == 0 {
            return;
        }
        raw.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while raw.len() < head_end + length {
        let n = stream.read(&mut chunk).await.expect("read body");
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
    }

    log.lock().expect("log").push(Captured {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        head: head.to_ascii_lowercase(),
        body: serde_json::from_slice(&raw[head_end..]).unwrap_or(Value::Null),
    });

    let payload = reply.to_string();
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
        payload.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .expect("write response");
    let _ = stream.shutdown().await;
}

fn captured(log: &Log) -> Vec<Captured> {
    log.lock().expect("log").clone()
}

#[tokio::test]
async fn taken_task_comes_back_as_a_benign_status_error() {
    let (backend, log) =
        start_test_server(vec![(400, json!({"detail": "Task already taken"}))]).await;

    let err = backend
        .start_task("u1", "P1")
        .await
        .expect_err("conflict");
    assert_eq!(err.kind, ApiErrorKind::Status(400));
    assert_eq!(err.message, "Task already taken");
    assert!(err.is_benign());

    let seen = captured(&log);
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].request_line,
        "POST /api/tasks/P1/start?user_id=u1 HTTP/1.1"
    );
    assert!(seen[0].head.contains("authorization: bearer test-token"));
}

#[tokio::test]
async fn mutations_send_the_expected_query_and_body() {
    let (backend, log) = start_test_server(vec![
        (200, json!({"id": "u1", "likedTaskIds": ["P1"]})),
        (200, json!({"id": "u1", "balance": 30000})),
    ])
    .await;

    let liked = backend.like_task("u1", "P1").await.expect("like");
    assert!(liked.has_liked("P1"));
    let after = backend.withdraw("u1", 50000.0, "b1").await.expect("withdraw");
    assert_eq!(after.balance, 30000.0);

    let seen = captured(&log);
    assert_eq!(
        seen[0].request_line,
        "POST /api/tasks/P1/like?user_id=u1 HTTP/1.1"
    );
    assert_eq!(seen[1].request_line, "POST /api/users/u1/withdraw HTTP/1.1");
    assert_eq!(seen[1].body, json!({"amount": 50000.0, "accountId": "b1"}));
}

#[tokio::test]
async fn missing_user_and_paged_listing() {
    let (backend, log) = start_test_server(vec![
        (404, json!({"detail": null})),
        (
            200,
            json!({"tasks": [{"id": "T1", "platformId": "P1", "status": "reviewing"}], "total": 21}),
        ),
    ])
    .await;

    let err = backend.get_user("u9").await.expect_err("missing");
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.message, "Request failed");
    assert!(!err.is_benign());

    let page = backend.user_tasks("u1", 2, 20).await.expect("tasks");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total, 21);

    let seen = captured(&log);
    assert_eq!(seen[0].request_line, "GET /api/users/u9 HTTP/1.1");
    assert_eq!(
        seen[1].request_line,
        "GET /api/users/u1/tasks?page=2&per_page=20 HTTP/1.1"
    );
}

#[tokio::test]
async fn admin_dashboard_stats_are_decoded() {
    let (backend, log) = start_test_server(vec![(
        200,
        json!({"totalUsers": 12, "totalBalance": 450000, "pendingWithdrawals": 3}),
    )])
    .await;

    let stats = backend.dashboard_stats().await.expect("stats");
    assert_eq!(stats.total_users, 12);
    assert_eq!(stats.total_balance, 450000.0);
    assert_eq!(stats.pending_withdrawals, 3);
    assert_eq!(stats.pending_tasks, 0);

    let seen = captured(&log);
    assert_eq!(seen[0].request_line, "GET /api/admin/dashboard-stats HTTP/1.1");
}
