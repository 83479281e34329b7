use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TOKEN_ENV: &str = "DOCCHAT_TEST_GITHUB_TOKEN";

fn docchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docchat");
    path
}

fn setup_test_env(api_base: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let config_content = format!(
        r#"[harvest]
output_dir = "{root}/data"

[github]
api_base_url = "{api}"
token_env = "{token_env}"

[[github.repos]]
owner = "octo"
repo = "docs"
path = "guides"

[db]
path = "{root}/data/docchat.sqlite"

[embedding]
provider = "openai"
model = "test-embed"
dims = 3
max_retries = 0
url = "{api}/v1"

[llm]
model = "test-chat"
max_retries = 0
url = "{api}/v1"
"#,
        root = root.display(),
        api = api_base,
        token_env = TOKEN_ENV,
    );

    let config_path = config_dir.join("docchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docchat(config_path: &Path, args: &[&str], envs: &[(&str, &str)]) -> (String, String, bool) {
    let binary = docchat_binary();
    let mut cmd = Command::new(&binary);
    cmd.arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove(TOKEN_ENV)
        .env_remove("OPENAI_API_KEY");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn record_line(title: &str, body: &str) -> String {
    json!({
        "title": title,
        "body": body,
        "source": { "owner": "octo", "repo": "docs" }
    })
    .to_string()
}

/// Mounts a `guides/` directory holding `install.md`, `logo.png` and a
/// `reference/` subdirectory with `config.mdx`.
async fn mount_docs_repo(server: &MockServer) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/repos/octo/docs/contents/guides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "install.md", "path": "guides/install.md", "type": "file",
                "download_url": format!("{}/raw/guides/install.md", uri)
            },
            {
                "name": "logo.png", "path": "guides/logo.png", "type": "file",
                "download_url": format!("{}/raw/guides/logo.png", uri)
            },
            { "name": "reference", "path": "guides/reference", "type": "dir", "download_url": null }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/docs/contents/guides/reference"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "config.mdx", "path": "guides/reference/config.mdx", "type": "file",
                "download_url": format!("{}/raw/guides/reference/config.mdx", uri)
            }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/guides/install.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# Install\n\nRun pip install docchat."))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/guides/reference/config.mdx"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("# Config\n\n<Tip>Edit the config file.</Tip>"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/guides/logo.png"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

/// Embeds text as `[#install, #config, 0.01]`.
struct KeywordEmbeddings;

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let data: Vec<serde_json::Value> = body["input"]
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let text = text.as_str().unwrap().to_lowercase();
                json!({
                    "index": i,
                    "embedding": [
                        text.matches("install").count() as f32 + 0.01,
                        text.matches("config").count() as f32 + 0.01,
                        0.01
                    ]
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
    }
}

async fn mount_openai(server: &MockServer, answer: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbeddings)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": answer } }]
        })))
        .mount(server)
        .await;
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, stderr, success) = run_docchat(&config_path, &["init"], &[]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docchat.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (_, _, success1) = run_docchat(&config_path, &["init"], &[]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docchat(&config_path, &["init"], &[]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docchat(&tmp.path().join("nope.toml"), &["init"], &[]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_chat_mode_rejected() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[chat]\nmode = \"memory_chat\"\n");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_docchat(&config_path, &["init"], &[]);
    assert!(!success);
    assert!(stderr.contains("Unknown chat mode"));
}

#[test]
fn test_sources() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, _, success) = run_docchat(&config_path, &["sources"], &[]);
    assert!(success);
    assert!(stdout.contains("octo/docs"));
    assert!(stdout.contains("guides"));
    assert!(stdout.contains("NOT SET"));

    let (stdout, _, success) = run_docchat(&config_path, &["sources"], &[(TOKEN_ENV, "t")]);
    assert!(success);
    assert!(!stdout.contains("NOT SET"));
}

#[test]
fn test_harvest_without_token_fails_before_output() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let stale = tmp.path().join("data/documentation_en_2024_01_31.jsonl");
    fs::write(&stale, record_line("old.md", "old") + "\n").unwrap();

    let (_, stderr, success) =
        run_docchat(&config_path, &["harvest", "--date", "2024-01-31"], &[]);
    assert!(!success, "harvest without token should fail");
    assert!(stderr.contains(TOKEN_ENV));
    // Nothing was touched.
    assert!(fs::read_to_string(&stale).unwrap().contains("old.md"));
}

#[test]
fn test_harvest_rejects_bad_date() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let (_, stderr, success) =
        run_docchat(&config_path, &["harvest", "--date", "31/01/2024"], &[(TOKEN_ENV, "t")]);
    assert!(!success);
    assert!(stderr.contains("expected YYYY-MM-DD"));
}

#[test]
fn test_index_without_dataset_fails() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let (_, stderr, success) =
        run_docchat(&config_path, &["index"], &[("OPENAI_API_KEY", "k")]);
    assert!(!success);
    assert!(stderr.contains("No harvested dataset"));
}

#[test]
fn test_ask_unknown_mode_errors() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let dataset = tmp.path().join("data/documentation_en_2024_01_31.jsonl");
    fs::write(&dataset, record_line("a.md", "alpha") + "\n").unwrap();

    let (_, stderr, success) = run_docchat(
        &config_path,
        &["ask", "hello", "--mode", "telepathy"],
        &[("OPENAI_API_KEY", "k")],
    );
    assert!(!success);
    assert!(stderr.contains("Unknown chat mode"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_harvest_writes_dated_file() {
    let server = MockServer::start().await;
    mount_docs_repo(&server).await;
    let (tmp, config_path) = setup_test_env(&server.uri());

    let (stdout, stderr, success) = run_docchat(
        &config_path,
        &["harvest", "--date", "2024-01-31"],
        &[(TOKEN_ENV, "test-token")],
    );
    assert!(success, "harvest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files written: 2"));
    assert!(stdout.contains("ok"));

    let output = tmp.path().join("data/documentation_en_2024_01_31.jsonl");
    let raw = fs::read_to_string(&output).unwrap();
    let lines: Vec<serde_json::Value> = raw
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["title"], "install.md");
    assert_eq!(lines[1]["title"], "config.mdx");
    assert_eq!(lines[1]["body"], "# Config Edit the config file.");

    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|r| r.headers.get("authorization").unwrap() == "Bearer test-token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_then_ask_end_to_end() {
    let server = MockServer::start().await;
    mount_openai(&server, "Run pip install docchat.").await;
    let (tmp, config_path) = setup_test_env(&server.uri());

    let dataset = tmp.path().join("data/documentation_en_2024_01_31.jsonl");
    fs::write(
        &dataset,
        format!(
            "{}\n{}\n",
            record_line("install.md", "Run pip install docchat."),
            record_line("config.md", "Edit the config file.")
        ),
    )
    .unwrap();
    let envs = [("OPENAI_API_KEY", "test-key")];

    let (stdout, stderr, success) = run_docchat(&config_path, &["index"], &envs);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 2"));
    assert!(stdout.contains("embedded: 2"));

    let (stdout, _, success) = run_docchat(&config_path, &["index"], &envs);
    assert!(success);
    assert!(stdout.contains("up to date"));

    let (stdout, stderr, success) =
        run_docchat(&config_path, &["search", "install", "--limit", "1"], &envs);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("install.md (octo/docs)"));
    assert!(!stdout.contains("config.md"));

    let (stdout, stderr, success) =
        run_docchat(&config_path, &["ask", "How do I install it?", "--mode", "qa"], &envs);
    assert!(success, "ask failed: {}", stderr);
    assert_eq!(stdout.trim(), "Run pip install docchat.");
}
