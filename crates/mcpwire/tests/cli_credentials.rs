#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

const BIN: &str = env!("CARGO_BIN_EXE_mcpwire");

struct KeyPair {
    public_pem: String,
    private_pem: String,
}

fn key_pair() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation");
        KeyPair {
            public_pem: private
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .expect("public pem"),
            private_pem: (*private.to_pkcs1_pem(LineEnding::LF).expect("private pem")).clone(),
        }
    })
}

/// Writes the key pair into `dir`, private key with `mode`.
fn write_keys(dir: &Path, mode: u32) -> (PathBuf, PathBuf) {
    let keys = key_pair();
    let public = dir.join("id_rsa_public.pem");
    let private = dir.join("id_rsa");
    std::fs::write(&public, &keys.public_pem).expect("public key should be writable");
    std::fs::write(&private, &keys.private_pem).expect("private key should be writable");
    std::fs::set_permissions(&private, std::fs::Permissions::from_mode(mode))
        .expect("chmod should succeed");
    (public, private)
}

fn client() -> Command {
    let mut command = Command::new(BIN);
    command
        .args(["--log-level", "error"])
        .stdin(Stdio::null())
        .env_remove("MCPWIRE_CONFIG")
        .env_remove("MCPWIRE_TOKEN")
        .env_remove("MCPWIRE_PASSWORD");
    command
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn encrypt_then_decrypt_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (public, private) = write_keys(dir.path(), 0o600);

    let encrypted = client()
        .args(["--format", "raw", "encrypt-password", "--password", "s3cret"])
        .arg("--public-key")
        .arg(&public)
        .output()
        .expect("encrypt should run");
    assert_eq!(encrypted.status.code(), Some(0));
    let ciphertext = stdout_text(&encrypted);
    assert_eq!(ciphertext.len(), 344);
    assert!(!ciphertext.contains("s3cret"));

    let decrypted = client()
        .args(["--format", "raw", "decrypt-password", "--ciphertext", &ciphertext])
        .arg("--private-key")
        .arg(&private)
        .output()
        .expect("decrypt should run");
    assert_eq!(decrypted.status.code(), Some(0));
    assert_eq!(stdout_text(&decrypted), "s3cret");
}

#[test]
fn encrypt_json_output_wraps_ciphertext() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (public, _) = write_keys(dir.path(), 0o600);

    let output = client()
        .args(["--format", "json", "encrypt-password", "--password", "pw"])
        .arg("--public-key")
        .arg(&public)
        .output()
        .expect("encrypt should run");
    let value: Value = serde_json::from_str(&stdout_text(&output)).expect("json output");
    assert!(value["ciphertext"].as_str().is_some_and(|c| c.len() == 344));
}

#[test]
fn garbage_ciphertext_is_data_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, private) = write_keys(dir.path(), 0o600);

    let output = client()
        .args(["decrypt-password", "--ciphertext", "not base64!"])
        .arg("--private-key")
        .arg(&private)
        .output()
        .expect("decrypt should run");
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("decryption failed"));
}

#[test]
fn group_readable_private_key_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, private) = write_keys(dir.path(), 0o644);

    let output = client()
        .args(["decrypt-password", "--ciphertext", "QUJD"])
        .arg("--private-key")
        .arg(&private)
        .output()
        .expect("decrypt should run");
    assert_eq!(output.status.code(), Some(50));
}

#[test]
fn encrypted_login_requires_public_key() {
    let output = client()
        .args([
            "login",
            "--server-ip",
            "127.0.0.1",
            "--server-port",
            "5000",
            "--email",
            "a@example.com",
            "--password",
            "pw",
            "--encrypt-password",
        ])
        .output()
        .expect("login should run");
    assert_eq!(output.status.code(), Some(64));
}

/// Stub holding the private key, killed on drop.
struct DecryptingStub {
    child: Child,
    port: String,
}

impl DecryptingStub {
    fn start(private: &Path) -> Self {
        let mut child = client()
            .args(["--format", "json", "stub", "--bind", "127.0.0.1:0", "--count", "1"])
            .arg("--private-key")
            .arg(private)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("stub should start");
        let mut line = String::new();
        BufReader::new(child.stdout.take().expect("piped stdout"))
            .read_line(&mut line)
            .expect("stub should announce its address");
        let announced: Value = serde_json::from_str(&line).expect("announcement should be JSON");
        let port = announced["listening"]
            .as_str()
            .and_then(|addr| addr.rsplit(':').next())
            .expect("address should end with a port")
            .to_string();
        Self { child, port }
    }
}

impl Drop for DecryptingStub {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn encrypted_login_is_decrypted_by_server() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (public, private) = write_keys(dir.path(), 0o600);
    let stub = DecryptingStub::start(&private);

    let config = dir.path().join("config.json");
    std::fs::write(
        &config,
        json!({
            "Server_Config": { "PW_ENCRYPTION": "true", "PUBLIC_KEY": public }
        })
        .to_string(),
    )
    .expect("config should be writable");

    let output = client()
        .args(["--format", "json", "login", "--server-ip", "127.0.0.1"])
        .args(["--server-port", &stub.port])
        .args(["--email", "a@example.com", "--password", "pw"])
        .arg("--config")
        .arg(&config)
        .output()
        .expect("login should run");

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let response: Value = serde_json::from_str(&stdout_text(&output)).expect("json response");
    assert_eq!(response, json!({"status": "ok", "command": "login"}));
}

#[test]
fn plaintext_password_fails_server_decryption() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, private) = write_keys(dir.path(), 0o600);
    let stub = DecryptingStub::start(&private);

    let output = client()
        .args(["--format", "json", "login", "--server-ip", "127.0.0.1"])
        .args(["--server-port", &stub.port])
        .args(["--email", "a@example.com", "--password", "pw"])
        .output()
        .expect("login should run");

    assert_eq!(output.status.code(), Some(0));
    let response: Value = serde_json::from_str(&stdout_text(&output)).expect("json response");
    assert_eq!(response["status"], "error");
}
