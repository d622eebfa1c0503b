use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use galley_core::{Category, IgnoreRules, KitchenName, RecipeName, RecipePath};
use galley_remote::HttpRemote;
use galley_sync::remote::{FileChange, MergeHeads, ResolvedContent};
use galley_sync::{content_id_of, RecipeRemote, RemoteError};
use serde_json::{json, Value};
use tempfile::TempDir;

/// One request as seen by the stub server.
struct Captured {
    request_line: String,
    authorization: Option<String>,
    body: Vec<u8>,
}

impl Captured {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

/// Serve `replies` in order, one connection each, and report what arrived.
fn serve(replies: Vec<(u16, String)>) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for (status, body) in replies {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            let mut length = 0;
            let mut authorization = None;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    match name.to_ascii_lowercase().as_str() {
                        "content-length" => length = value.trim().parse().unwrap_or(0),
                        "authorization" => authorization = Some(value.trim().to_string()),
                        _ => {}
                    }
                }
            }
            let mut received = vec![0; length];
            reader.read_exact(&mut received).expect("body");
            let _ = tx.send(Captured {
                request_line: request_line.trim_end().to_string(),
                authorization,
                body: received,
            });

            let mut stream = stream;
            let reply = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes());
        }
    });
    (url, rx)
}

fn b64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn p(raw: &str) -> RecipePath {
    RecipePath::parse(raw).expect("path")
}

fn client(url: &str) -> HttpRemote {
    HttpRemote::new(url, Some("secret".into()), IgnoreRules::default()).expect("client")
}

#[test]
fn status_is_computed_from_manifest() {
    let manifest = json!({
        "recipe_sha": "head-7",
        "files": {
            "a.txt": content_id_of(b"A").0,
            "res/b.txt": "remote-only-id"
        }
    });
    let (url, requests) = serve(vec![(200, manifest.to_string())]);
    let recipe_dir = TempDir::new().expect("recipe dir");
    std::fs::write(recipe_dir.path().join("a.txt"), "A").expect("write");

    let status = client(&url)
        .recipe_status(&KitchenName::from("dev"), &RecipeName::from("demo"), recipe_dir.path())
        .expect("status");

    let request = requests.recv().expect("request");
    assert_eq!(request.request_line, "GET /v2/recipe/manifest/dev/demo HTTP/1.1");
    assert_eq!(request.authorization.as_deref(), Some("Bearer secret"));
    assert_eq!(status.recipe_sha.as_ref().map(|s| s.0.as_str()), Some("head-7"));
    assert_eq!(status.files(Category::Same).count(), 1);
    let only_remote: Vec<_> = status
        .files(Category::OnlyRemote)
        .map(|(folder, record)| format!("{folder}/{}", record.filename))
        .collect();
    assert_eq!(only_remote, vec!["demo/res/b.txt"]);
}

#[test]
fn get_recipe_sends_paths_and_decodes_contents() {
    let tree = json!({
        "baseline_id": "head-1",
        "folders": {
            "demo/res": [{ "filename": "c.sql", "sha": "x", "content": b64(b"select 1;") }]
        }
    });
    let (url, requests) = serve(vec![(200, tree.to_string())]);

    let paths = vec!["res/*".to_string()];
    let tree = client(&url)
        .get_recipe(&KitchenName::from("dev"), &RecipeName::from("demo"), Some(&paths))
        .expect("get");

    let request = requests.recv().expect("request");
    assert_eq!(request.request_line, "POST /v2/recipe/get/dev/demo HTTP/1.1");
    assert_eq!(request.json(), json!({ "paths": ["res/*"] }));
    let (folder, file) = tree.files().next().expect("one file");
    assert_eq!(folder, "demo/res");
    assert_eq!(file.content, b"select 1;");
}

#[test]
fn update_sends_changes_and_reads_results() {
    let reply = json!({
        "results": { "a.txt": true, "gone.txt": false },
        "issues": [{ "file": "a.txt", "severity": "warning", "description": "long line" }],
        "recipe_sha": "head-2"
    });
    let (url, requests) = serve(vec![(200, reply.to_string())]);
    let mut changes = BTreeMap::new();
    changes.insert(
        p("a.txt"),
        FileChange::Upsert {
            contents: b"A2".to_vec(),
            is_new: false,
        },
    );
    changes.insert(p("gone.txt"), FileChange::Delete);

    let response = client(&url)
        .update_files(&KitchenName::from("dev"), &RecipeName::from("demo"), "msg", &changes)
        .expect("update");

    let request = requests.recv().expect("request");
    assert_eq!(
        request.json(),
        json!({
            "message": "msg",
            "changes": {
                "a.txt": { "contents": b64(b"A2"), "isNew": false },
                "gone.txt": {}
            }
        })
    );
    assert_eq!(response.results.get(&p("gone.txt")), Some(&false));
    assert!(!response.has_errors());
    assert_eq!(response.recipe_sha.map(|s| s.0), Some("head-2".to_string()));
}

#[test]
fn expired_heads_map_to_baseline_expired() {
    let reply = json!({ "error": "target moved", "sha_expired": true });
    let (url, requests) = serve(vec![(409, reply.to_string())]);
    let heads = MergeHeads {
        source_kitchen_sha: "s".into(),
        target_kitchen_sha: "t".into(),
    };
    let mut resolved = BTreeMap::new();
    resolved.insert(p("demo/a.sql"), ResolvedContent::Text("x".into()));

    let err = client(&url)
        .kitchens_merge(&KitchenName::from("feature"), &KitchenName::from("dev"), &heads, &resolved)
        .expect_err("expired");

    assert!(matches!(err, RemoteError::BaselineExpired { .. }), "{err}");
    let request = requests.recv().expect("request");
    assert_eq!(request.request_line, "POST /v2/kitchen/merge/feature/dev HTTP/1.1");
    assert_eq!(request.json()["resolved"]["demo/a.sql"], json!({ "text": "x" }));
    assert_eq!(request.json()["target_kitchen_sha"], json!("t"));
}

#[test]
fn server_errors_carry_status() {
    let (url, _requests) = serve(vec![(500, r#"{"message":"boom"}"#.to_string())]);

    let err = client(&url)
        .active_servings(&KitchenName::from("dev"))
        .expect_err("server error");

    match err {
        RemoteError::Http { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn unreachable_remote_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let err = client(&url)
        .active_servings(&KitchenName::from("dev"))
        .expect_err("unreachable");

    assert!(matches!(err, RemoteError::Transport { .. }), "{err}");
}
