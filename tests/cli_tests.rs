//! CLI interface tests

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const STORY: &str = "<Story><Content>Hello</Content><Content>World</Content><Content>Hello</Content></Story>";

/// Runs the binary with config and credentials isolated under `home`.
fn idml_translator(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_idml-translator"));
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_MODEL");
    cmd
}

fn create_idml(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_command() {
    let home = TempDir::new().unwrap();
    let output = idml_translator(home.path())
        .arg("--help")
        .output()
        .expect("Failed to run help");

    assert!(output.status.success());
    let out = stdout(&output);
    for command in ["translate", "text", "estimate", "languages", "config"] {
        assert!(out.contains(command), "Should list {} command", command);
    }
}

#[test]
fn test_version_command() {
    let home = TempDir::new().unwrap();
    let output = idml_translator(home.path())
        .arg("--version")
        .output()
        .expect("Failed to run version");

    assert!(output.status.success());
    assert!(stdout(&output).contains("idml-translator"), "Should show program name");
}

#[test]
fn test_translate_help() {
    let home = TempDir::new().unwrap();
    let output = idml_translator(home.path())
        .args(["translate", "--help"])
        .output()
        .expect("Failed to run translate help");

    assert!(output.status.success());
    let out = stdout(&output);
    for option in ["--target", "--source", "--concurrent", "--max-tokens", "--delay", "--prompt"] {
        assert!(out.contains(option), "Should have {} option", option);
    }
}

#[test]
fn test_invalid_command() {
    let home = TempDir::new().unwrap();
    let output = idml_translator(home.path())
        .arg("invalid_command")
        .output()
        .expect("Failed to run invalid command");

    assert!(!output.status.success(), "Should fail on invalid command");
}

#[test]
fn test_missing_input() {
    let home = TempDir::new().unwrap();
    let output = idml_translator(home.path())
        .args(["translate", "-t", "cs"])
        .output()
        .expect("Failed to run translate without input");

    assert!(!output.status.success(), "Should fail without input");
}

#[test]
fn test_languages_lists_codes() {
    let home = TempDir::new().unwrap();
    let output = idml_translator(home.path())
        .arg("languages")
        .output()
        .expect("Failed to run languages");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("cs") && out.contains("Czech"));
    assert!(out.contains("hu") && out.contains("Hungarian"));
}

#[test]
fn test_estimate_json() {
    let home = TempDir::new().unwrap();
    let idml = home.path().join("doc.idml");
    create_idml(&idml, &[("Stories/Story_u1.xml", STORY)]);

    let output = idml_translator(home.path())
        .arg("estimate")
        .arg(&idml)
        .args(["-t", "cs,en,de", "-s", "en", "--json"])
        .output()
        .expect("Failed to run estimate");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["segments"], 3);
    assert_eq!(json["languages"], serde_json::json!(["cs", "de"]));
    assert!(json["tokens"].as_u64().unwrap() > 0);
    assert!(json["cost"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_estimate_rejects_unsafe_archive() {
    let home = TempDir::new().unwrap();
    let idml = home.path().join("evil.idml");
    create_idml(&idml, &[("../outside.xml", "<x/>")]);

    let output = idml_translator(home.path())
        .arg("estimate")
        .arg(&idml)
        .args(["-t", "cs"])
        .output()
        .expect("Failed to run estimate");

    assert!(!output.status.success());
    assert!(stderr(&output).contains("escapes"));
}

#[test]
fn test_translate_requires_api_key() {
    let home = TempDir::new().unwrap();
    let idml = home.path().join("doc.idml");
    create_idml(&idml, &[("Stories/Story_u1.xml", STORY)]);

    let output = idml_translator(home.path())
        .arg("translate")
        .arg(&idml)
        .args(["-t", "cs"])
        .output()
        .expect("Failed to run translate");

    assert!(!output.status.success());
    assert!(stderr(&output).contains("API key required"));
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();

    let set = idml_translator(home.path())
        .args(["config", "set", "translation.max_tokens", "500"])
        .output()
        .expect("Failed to run config set");
    assert!(set.status.success(), "stderr: {}", stderr(&set));

    let get = idml_translator(home.path())
        .args(["config", "get", "translation.max_tokens"])
        .output()
        .expect("Failed to run config get");
    assert!(get.status.success());
    assert!(stdout(&get).contains("translation.max_tokens = 500"));

    let bad = idml_translator(home.path())
        .args(["config", "set", "translation.max_tokens", "many"])
        .output()
        .expect("Failed to run config set");
    assert!(!bad.status.success());
}

#[tokio::test]
async fn test_translate_against_mock_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "[[SEG1]] Ahoj\n[[SEG2]] Svete" } }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let idml = home.path().join("doc.idml");
    create_idml(&idml, &[("Stories/Story_u1.xml", STORY)]);
    let out_dir = home.path().join("out");

    let mut cmd = idml_translator(home.path());
    cmd.arg("translate")
        .arg(&idml)
        .args(["-t", "cs", "-s", "en", "--delay", "0", "--json", "--api-key", "test-key"])
        .arg("--api-base")
        .arg(format!("{}/v1", server.uri()))
        .arg("-o")
        .arg(&out_dir);

    let output = tokio::task::spawn_blocking(move || cmd.output())
        .await
        .unwrap()
        .expect("Failed to run translate");
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let record: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(record["status"], "completed");
    assert_eq!(record["progress"], 100);
    assert_eq!(record["tokens"], 30);

    let translated = out_dir.join("doc-cs.idml");
    assert!(fs::metadata(&translated).is_ok());

    let mut archive = ZipArchive::new(File::open(&translated).unwrap()).unwrap();
    let mut story = String::new();
    archive
        .by_name("Stories/Story_u1.xml")
        .unwrap()
        .read_to_string(&mut story)
        .unwrap();
    assert_eq!(
        story,
        "<Story><Content>Ahoj</Content><Content>Svete</Content><Content>Ahoj</Content></Story>"
    );
}
