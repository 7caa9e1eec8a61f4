use std::process::Command;

use anyhow::Result;
use assert_cmd::assert::OutputAssertExt;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use indoc::indoc;
use insta::assert_snapshot;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sdist(filename: &str, sha256: &str) -> serde_json::Value {
    json!({
        "filename": filename,
        "packagetype": "sdist",
        "digests": { "sha256": sha256 },
        "yanked": false,
    })
}

async fn mount(server: &MockServer, url: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(url))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// `flask` depends on `itsdangerous`; `setuptools` has no dependencies. Only source
/// distributions, so the host platform doesn't matter.
async fn index() -> MockServer {
    let server = MockServer::start().await;
    mount(
        &server,
        "/pypi/flask/json",
        json!({
            "releases": {
                "0.10.1": [sdist("Flask-0.10.1.tar.gz", "aaaa")],
                "1.0rc1": [sdist("Flask-1.0rc1.tar.gz", "cccc")],
            },
        }),
    )
    .await;
    mount(
        &server,
        "/pypi/flask/0.10.1/json",
        json!({
            "info": { "name": "Flask", "version": "0.10.1", "requires_dist": ["itsdangerous>=0.21"] },
            "urls": [sdist("Flask-0.10.1.tar.gz", "aaaa")],
        }),
    )
    .await;
    mount(
        &server,
        "/pypi/flask/1.0rc1/json",
        json!({
            "info": { "name": "Flask", "version": "1.0rc1", "requires_dist": null },
            "urls": [sdist("Flask-1.0rc1.tar.gz", "cccc")],
        }),
    )
    .await;
    mount(
        &server,
        "/pypi/itsdangerous/json",
        json!({
            "releases": {
                "0.24": [sdist("itsdangerous-0.24.tar.gz", "eeee"), sdist("itsdangerous-0.24.zip", "ffff")],
            },
        }),
    )
    .await;
    mount(
        &server,
        "/pypi/itsdangerous/0.24/json",
        json!({
            "info": { "name": "itsdangerous", "version": "0.24", "requires_dist": null },
            "urls": [],
        }),
    )
    .await;
    mount(
        &server,
        "/pypi/setuptools/json",
        json!({
            "releases": { "35.0.0": [sdist("setuptools-35.0.0.zip", "5555")] },
        }),
    )
    .await;
    mount(
        &server,
        "/pypi/setuptools/35.0.0/json",
        json!({
            "info": { "name": "setuptools", "version": "35.0.0", "requires_dist": [] },
            "urls": [],
        }),
    )
    .await;
    server
}

struct Context {
    temp_dir: TempDir,
    cache_dir: TempDir,
    index_url: String,
}

impl Context {
    fn new(server: &MockServer) -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            cache_dir: TempDir::new()?,
            index_url: format!("{}/simple", server.uri()),
        })
    }

    fn compile(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_pincer"));
        command
            .arg("compile")
            .arg("--no-header")
            .arg("--index-url")
            .arg(&self.index_url)
            .arg("--cache-dir")
            .arg(self.cache_dir.path())
            .env_remove("PINCER_INDEX_URL")
            .env_remove("PINCER_NO_CACHE")
            .env_remove("RUST_LOG")
            .current_dir(&self.temp_dir);
        command
    }
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[tokio::test(flavor = "multi_thread")]
async fn compile_annotated() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str(indoc! {"
            flask
            setuptools
        "})?;

    let output = context.compile().arg("requirements.in").output()?;
    output
        .clone()
        .assert()
        .success()
        .stderr(predicate::str::contains("Resolved 3 packages"));
    assert_snapshot!(stdout(&output), @r"
    flask==0.10.1
        # via -r requirements.in
    itsdangerous==0.24
        # via flask

    # The following packages are considered to be unsafe in a requirements file:
    # setuptools
    ");

    // The dependency lists were cached for the default interpreter.
    context
        .cache_dir
        .child("depcache-cp3.12.json")
        .assert(predicate::str::contains("itsdangerous>=0.21"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn compile_allow_unsafe_with_hashes() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str("flask\nsetuptools\n")?;

    let output = context
        .compile()
        .arg("requirements.in")
        .arg("--allow-unsafe")
        .arg("--generate-hashes")
        .arg("--no-annotate")
        .output()?;
    output.clone().assert().success();
    assert_snapshot!(stdout(&output), @r"
    flask==0.10.1 \
        --hash=sha256:aaaa
    itsdangerous==0.24 \
        --hash=sha256:eeee \
        --hash=sha256:ffff

    # The following packages are considered to be unsafe in a requirements file:
    setuptools==35.0.0 \
        --hash=sha256:5555
    ");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn compile_to_output_file() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str("flask\n-c constraints.txt\n")?;
    context
        .temp_dir
        .child("constraints.txt")
        .write_str("itsdangerous<1\nclick==6.7\n")?;

    context
        .compile()
        .arg("requirements.in")
        .arg("--output-file")
        .arg("requirements.txt")
        .arg("--quiet")
        .assert()
        .success()
        .stdout("")
        .stderr("");

    let requirements_txt = fs_err::read_to_string(context.temp_dir.join("requirements.txt"))?;
    assert_snapshot!(requirements_txt, @r"
    flask==0.10.1
        # via -r requirements.in
    itsdangerous==0.24
        # via
        #   flask
        #   -c constraints.txt
    ");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn compile_prereleases() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str("flask>=1.0.dev0\n")?;

    let output = context
        .compile()
        .arg("requirements.in")
        .arg("--pre")
        .arg("--no-annotate")
        .output()?;
    output.clone().assert().success();
    assert_snapshot!(stdout(&output), @"flask==1.0rc1");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn no_candidate_found() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str("flask>=2\n")?;

    context
        .compile()
        .arg("requirements.in")
        .arg("-o")
        .arg("requirements.txt")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "error: Could not find a version that matches flask>=2",
        ))
        .stderr(predicate::str::contains("Tried: 0.10.1"))
        .stderr(predicate::str::contains("Skipped pre-versions: 1.0rc1"));

    // Nothing is written on failure.
    context
        .temp_dir
        .child("requirements.txt")
        .assert(predicate::path::missing());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn pin_to_missing_version() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str("flask==2.0\n")?;

    context
        .compile()
        .arg("requirements.in")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "error: Could not find a version that matches flask==2.0",
        ))
        .stderr(predicate::str::contains("Tried: 0.10.1"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_constraint_is_skipped() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str("flask\n")?;
    context
        .temp_dir
        .child("constraints.txt")
        .write_str("itsdangerous (>=0.24\nitsdangerous<1\n")?;

    let output = context
        .compile()
        .arg("requirements.in")
        .arg("--constraint")
        .arg("constraints.txt")
        .output()?;
    output.clone().assert().success().stderr(predicate::str::contains(
        "warning: Skipping invalid constraint on line 1 of constraints.txt",
    ));
    assert_snapshot!(stdout(&output), @r"
    flask==0.10.1
        # via -r requirements.in
    itsdangerous==0.24
        # via
        #   flask
        #   -c constraints.txt
    ");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rebuild_discards_corrupt_cache() -> Result<()> {
    let server = index().await;
    let context = Context::new(&server)?;
    context
        .temp_dir
        .child("requirements.in")
        .write_str("itsdangerous\n")?;
    context
        .cache_dir
        .child("depcache-cp3.12.json")
        .write_str("{ not json")?;

    context
        .compile()
        .arg("requirements.in")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "error: Failed to load the dependency cache (use `--rebuild` to discard it)",
        ))
        .stderr(predicate::str::contains("Caused by"));

    let output = context
        .compile()
        .arg("requirements.in")
        .arg("--rebuild")
        .output()?;
    output.clone().assert().success();
    assert_snapshot!(stdout(&output), @r"
    itsdangerous==0.24
        # via -r requirements.in
    ");
    Ok(())
}

#[test]
fn missing_requirements_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    Command::new(env!("CARGO_BIN_EXE_pincer"))
        .arg("compile")
        .arg("missing.in")
        .arg("--no-cache")
        .current_dir(&temp_dir)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error: Failed to read `missing.in`"));
    Ok(())
}

#[test]
fn invalid_python_version() -> Result<()> {
    let temp_dir = TempDir::new()?;
    Command::new(env!("CARGO_BIN_EXE_pincer"))
        .arg("compile")
        .arg("requirements.in")
        .arg("--python-version")
        .arg("2.7")
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not supported, use 3.x"));
    Ok(())
}
