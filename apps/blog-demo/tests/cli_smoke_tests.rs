//! CLI smoke tests for the blog-demo binary
//!
//! These tests verify help output, configuration handling and a complete
//! scripted session against the in-process data service.

use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

/// Helper to run the blog-demo binary with given arguments
fn run_blog_demo(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_blog-demo"))
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute blog-demo")
}

/// Helper to run the blog-demo binary with timeout
async fn run_blog_demo_with_timeout(
    args: &[&str],
    timeout_duration: Duration,
) -> Result<std::process::Output, Box<dyn std::error::Error>> {
    let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_blog-demo"));
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    match timeout(timeout_duration, cmd.output()).await {
        Ok(result) => result.map_err(|e| e.into()),
        Err(elapsed) => Err(elapsed.into()),
    }
}

/// Writes a config whose home directory lives inside `dir`.
fn write_config(dir: &TempDir, modules: &str) -> String {
    let home = dir.path().join("home");
    let path = dir.path().join("config.yaml");
    let yaml = format!(
        r#"app:
  home_dir: "{}"
logging:
  default:
    console_level: info
    file: ""
modules:
{modules}
"#,
        home.to_string_lossy().replace('\\', "/")
    );
    std::fs::write(&path, yaml).expect("write config");
    path.to_string_lossy().to_string()
}

#[test]
fn test_cli_help_command() {
    let output = run_blog_demo(&["--help"]);

    assert!(output.status.success(), "Help command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("blog-demo"), "Should contain binary name");
    assert!(stdout.contains("Usage:"), "Should contain usage information");
    assert!(stdout.contains("run"), "Should contain 'run' subcommand");
    assert!(stdout.contains("check"), "Should contain 'check' subcommand");
    assert!(stdout.contains("--seed-demo"), "Should mention demo seeding");
}

#[test]
fn test_cli_invalid_command() {
    let output = run_blog_demo(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");
}

#[test]
fn test_check_accepts_valid_module_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "  blog_posts:\n    push_delay_ms: 10\n");

    let output = run_blog_demo(&["--config", &config, "check"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Check should pass: {stdout}");
    assert!(stdout.contains("Configuration check passed"));
    assert!(dir.path().join("home").is_dir(), "Home dir should be created");
}

#[test]
fn test_check_rejects_unknown_module_fields() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "  blog_posts:\n    push_delay: 10\n");

    let output = run_blog_demo(&["--config", &config, "check"]);

    assert!(!output.status.success(), "Typo in module config should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("blog_posts"), "Error should name the module: {stderr}");
}

#[test]
fn test_print_config_includes_seed_override() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "  blog_posts: {}\n");

    let output = run_blog_demo(&["--config", &config, "--seed-demo", "--print-config"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("seed_demo_data: true"), "{stdout}");
}

#[tokio::test]
async fn test_scripted_session_completes() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "  blog_posts:\n    push_delay_ms: 50\n");

    let output = run_blog_demo_with_timeout(
        &["--config", &config, "--seed-demo", "run"],
        Duration::from_secs(60),
    )
    .await
    .expect("blog-demo run should finish");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "Session should succeed: {stderr}");
}
