//! Webhook fan-out against real HTTP listeners.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use keyrack::config::Configuration;
use keyrack::error::EngineError;
use keyrack::provider::sms::{SmsSender, WebhookSms};
use keyrack::provider::webhook::{DeliveryError, PasswordTargets, TargetConfig};
use keyrack::{Collaborators, Engine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Minimal HTTP target double. Records every raw request (start line,
/// headers and body) and answers each with the given status.
async fn spawn_target(status: u16) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/hook", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => raw.extend_from_slice(&buf[..n]),
                        Err(_) => return,
                    }
                    if request_complete(&raw) {
                        break;
                    }
                }

                log.lock().unwrap().push(String::from_utf8_lossy(&raw).into_owned());

                let response = format!(
                    "HTTP/1.1 {status} Status\r\nContent-Length: 3\r\nConnection: close\r\n\r\nack"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (url, requests)
}

/// A request is complete once the headers ended and the announced body
/// length has arrived.
fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(split) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text
        .lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);
    text.len() >= split + 4 + content_length
}

fn target(name: &str, url: &str, body: &str) -> TargetConfig {
    TargetConfig {
        name: name.into(),
        url: url.into(),
        method: "POST".into(),
        content_type: "application/json".into(),
        body: body.into(),
        headers: HashMap::new(),
        skip_tls_verify: false,
        env: HashMap::new(),
    }
}

#[tokio::test]
async fn partial_failure_reports_only_failed_targets() {
    let (url1, requests1) = spawn_target(200).await;
    let (url2, _requests2) = spawn_target(500).await;
    let (url3, requests3) = spawn_target(204).await;

    let body = r#"{"user":"{{Username}}","pw":"{{Password}}","hash":"{{HashedPassword}}","realm":"{{Realm}}"}"#;
    let mut first = target("target1", &url1, body);
    first.env.insert("Realm".into(), "prod".into());

    let targets = PasswordTargets::from_config(vec![
        first,
        target("target2", &url2, body),
        target("target3", &url3, body),
    ])
    .unwrap();

    let errors = targets.sync_password("alice", "pw2", "$argon2id$stub").await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].name, "target2");
    assert!(matches!(
        errors[0].source,
        DeliveryError::Status { status: 500, ref body } if body == "ack"
    ));

    let first = requests1.lock().unwrap()[0].clone();
    assert!(first.contains(r#""user":"alice""#));
    assert!(first.contains(r#""pw":"pw2""#));
    assert!(first.contains(r#""hash":"$argon2id$stub""#));
    assert!(first.contains(r#""realm":"prod""#));

    let third = requests3.lock().unwrap()[0].clone();
    assert!(third.contains(r#""realm":"""#));
}

#[tokio::test]
async fn headers_are_rendered() {
    let (url, requests) = spawn_target(200).await;

    let mut config = target("hdr", &url, "{}");
    config
        .headers
        .insert("Authorization".into(), "Bearer {{Token}}".into());
    config.env.insert("Token".into(), "sekrit".into());

    let targets = PasswordTargets::from_config(vec![config]).unwrap();
    let errors = targets.sync_password("alice", "pw", "hash").await;
    assert!(errors.is_empty());

    let request = requests.lock().unwrap()[0].clone();
    assert!(request.contains("authorization: Bearer sekrit"));
    assert!(request.contains("content-type: application/json"));
}

#[tokio::test]
async fn target_variables_win_over_event_dataset() {
    let (url, requests) = spawn_target(200).await;

    let mut config = target("shadow", &url, "user={{Username}}");
    config.env.insert("Username".into(), "service-account".into());

    let targets = PasswordTargets::from_config(vec![config]).unwrap();
    targets.sync_password("alice", "pw", "hash").await;

    let request = requests.lock().unwrap()[0].clone();
    assert!(request.contains("user=service-account"));
    assert!(!request.contains("user=alice"));
}

#[tokio::test]
async fn change_password_fans_out_detached() {
    let (url, requests) = spawn_target(200).await;

    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
users_file: {users}
metadata_file: {meta}
argon2:
  memory_cost: 1024
  iterations: 1
  parallelism: 1
  hash_length: 32
password_targets:
  - name: caddy
    url: {url}
    body: '{{{{Username}}}}:{{{{Password}}}}:{{{{HashedPassword}}}}'
"#,
        users = dir.path().join("users").display(),
        meta = dir.path().join("users.toml").display(),
    );
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = Configuration::default().path(config_path).read();
    let engine = Engine::new(config, Collaborators::default()).unwrap();

    engine.account.signup("alice", "a@x.com", "pw1").await.unwrap();
    // Signup already fans out once; wait for it so the next assertion only
    // sees the change.
    wait_for_requests(&requests, 1).await;

    engine.account.change_password("alice", "pw1", "pw2").await.unwrap();
    wait_for_requests(&requests, 2).await;

    let request = requests.lock().unwrap()[1].clone();
    assert!(request.contains("alice:pw2:$argon2id$"));
}

async fn wait_for_requests(requests: &Arc<Mutex<Vec<String>>>, count: usize) {
    for _ in 0..200 {
        if requests.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {count} deliveries, saw {}",
        requests.lock().unwrap().len()
    );
}

#[tokio::test]
async fn sms_webhook_renders_and_sends() {
    let (url, requests) = spawn_target(200).await;

    let mut config = target("sms", &url, r#"{"to":"{{To}}","text":"{{Message}}"}"#);
    config.name = String::new();
    let sender = WebhookSms::from_config(Some(config)).unwrap();

    sender.send_sms("+33600000001", "code 123456").await.unwrap();

    let request = requests.lock().unwrap()[0].clone();
    assert!(request.contains(r#""to":"+33600000001""#));
    assert!(request.contains(r#""text":"code 123456""#));
}

#[tokio::test]
async fn sms_webhook_maps_http_failure() {
    let (url, _requests) = spawn_target(500).await;

    let sender =
        WebhookSms::from_config(Some(target("sms", &url, "{{Message}}")))
            .unwrap();
    let err = sender.send_sms("+33600000001", "code").await.unwrap_err();
    assert!(matches!(err, EngineError::SmsSendFailed));
}

#[test]
fn sms_webhook_requires_url_and_body() {
    assert!(WebhookSms::from_config(None).is_none());
    assert!(
        WebhookSms::from_config(Some(target("sms", "", "body"))).is_none()
    );
    assert!(
        WebhookSms::from_config(Some(target("sms", "http://x/", "")))
            .is_none()
    );
}
