mod common;

use anyhow::Context as _;
use axum::Router;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::tempdir;

use common::{KillOnDrop, MockUpstream, pick_unused_port, spawn_adapter, wait_http_ok};

const BANK: &str = r"
swagger: '2.0'
info: {title: Bank, version: '1'}
host: bank.invalid
basePath: /
paths:
  /accounts:
    get:
      operationId: getAccounts
  /accounts/{account_id}/mails:
    get:
      operationId: getMails
      parameters:
        - {name: account_id, in: path, required: true, type: string}
";

const PAY: &str = r"
openapi: 3.0.1
info: {title: Pay, version: '1'}
paths:
  /payments:
    post:
      operationId: createPayment
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [amount, currency]
              properties:
                amount: {type: number, minimum: 0.01}
                currency: {type: string, enum: [EUR, USD]}
";

async fn bank_api() -> anyhow::Result<MockUpstream> {
    let app = Router::new()
        .route(
            "/login",
            post(|| async {
                (
                    [("set-cookie", "JSESSIONID=live-token; Path=/")],
                    "{}",
                )
            }),
        )
        .route(
            "/accounts",
            get(|headers: HeaderMap| async move {
                let authed = headers
                    .get("cookie")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|c| c.contains("JSESSIONID=live-token"));
                if authed {
                    axum::Json(json!([{"id": "acc_1"}])).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        )
        .route(
            "/accounts/{account_id}/mails",
            get(|Path(id): Path<String>, uri: axum::http::Uri| async move {
                axum::Json(json!({"account": id, "query": uri.query()}))
            }),
        );
    MockUpstream::start(app).await
}

fn write_config(
    root: &std::path::Path,
    base_url: &str,
    require_auth: bool,
) -> anyhow::Result<std::path::PathBuf> {
    let specs = root.join("specs");
    std::fs::create_dir_all(&specs).context("create spec dir")?;
    std::fs::write(specs.join("bank.yaml"), BANK).context("write bank spec")?;
    std::fs::write(specs.join("pay.yml"), PAY).context("write pay spec")?;

    let path = root.join("adapter.yaml");
    std::fs::write(
        &path,
        format!(
            "openapiDir: {specs}\nforceBaseUrl: {base_url}\ntokenCachePath: {cache}\nrequireAuth: {require_auth}\n",
            specs = specs.display(),
            cache = root.join("token_cache").display(),
        ),
    )
    .context("write adapter config")?;
    Ok(path)
}

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> anyhow::Result<Value> {
    client
        .post(url)
        .json(&body)
        .send()
        .await
        .context("send")?
        .json()
        .await
        .context("decode")
}

#[tokio::test]
async fn end_to_end_invocation_validation_and_reload() -> anyhow::Result<()> {
    let upstream = bank_api().await?;
    let dir = tempdir().context("create temp dir")?;
    let cfg = write_config(dir.path(), upstream.base_url(), false)?;

    let port = pick_unused_port()?;
    let _child = KillOnDrop(spawn_adapter(&cfg, port, &[])?);
    let base = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base}/health"), Duration::from_secs(20)).await?;

    let client = reqwest::Client::new();
    let tools: Value = client.get(format!("{base}/tools")).send().await?.json().await?;
    let mut names: Vec<String> = tools
        .as_array()
        .context("tools array")?
        .iter()
        .filter_map(|t| t["name"].as_str().map(str::to_string))
        .collect();
    names.sort();
    assert_eq!(names, vec!["bank_getAccounts", "bank_getMails", "pay_createPayment"]);

    let mails = post_json(
        &client,
        format!("{base}/tools/bank_getMails"),
        json!({"arguments": {"account_id": "acc_1"}}),
    )
    .await?;
    assert_eq!(mails["status"], json!("success"), "{mails}");
    assert_eq!(mails["response"], json!({"account": "acc_1", "query": null}));

    let payment = post_json(
        &client,
        format!("{base}/tools/pay_createPayment"),
        json!({"arguments": {"amount": -5, "currency": "JPY"}}),
    )
    .await?;
    assert_eq!(payment["status"], json!("error"));
    assert_eq!(payment["errors"].as_array().map(Vec::len), Some(2));

    std::fs::remove_dir_all(dir.path().join("specs")).context("remove specs")?;
    std::fs::create_dir_all(dir.path().join("specs")).context("recreate specs")?;
    let reload = post_json(&client, format!("{base}/reload"), json!({})).await?;
    assert_eq!(reload, json!({"status": "success", "specsLoaded": 0, "toolsCreated": 0}));
    let tools: Value = client.get(format!("{base}/tools")).send().await?.json().await?;
    assert_eq!(tools, json!([]));
    Ok(())
}

#[tokio::test]
async fn end_to_end_authentication_flow() -> anyhow::Result<()> {
    let upstream = bank_api().await?;
    let dir = tempdir().context("create temp dir")?;
    let cfg = write_config(dir.path(), upstream.base_url(), true)?;

    let port = pick_unused_port()?;
    let _child = KillOnDrop(spawn_adapter(&cfg, port, &[("LOG_FORMAT", "json")])?);
    let base = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base}/health"), Duration::from_secs(20)).await?;
    let client = reqwest::Client::new();

    let denied = post_json(&client, format!("{base}/tools/bank_getAccounts"), json!({})).await?;
    assert_eq!(denied["status"], json!("auth_required"));

    let set = post_json(
        &client,
        format!("{base}/credentials"),
        json!({"username": "alice", "password": "secret"}),
    )
    .await?;
    assert_eq!(set["status"], json!("success"));

    let login = post_json(&client, format!("{base}/login"), json!({})).await?;
    assert_eq!(login["status"], json!("success"), "{login}");
    let cached = std::fs::read_to_string(dir.path().join("token_cache")).context("token cache")?;
    assert_eq!(cached.trim(), "live-token");

    let accounts = post_json(&client, format!("{base}/tools/getAccounts"), json!({})).await?;
    assert_eq!(accounts["status"], json!("success"), "{accounts}");
    assert_eq!(accounts["response"], json!([{"id": "acc_1"}]));

    let status: Value = client
        .get(format!("{base}/auth/status"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["authenticatedSpecs"], json!(["bank", "pay"]));
    Ok(())
}
