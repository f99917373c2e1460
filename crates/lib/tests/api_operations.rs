//! Integration test: start the controller on a free port with a scripted runner and
//! drive every route over HTTP. Does not require Fabric, docker or network.sh.
//! Server tasks are left running when each test ends.

use hlf_controller::api;
use hlf_controller::config::Config;
use hlf_controller::exec::{ExitState, Scripted, ScriptedRunner};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Start a controller and wait until GET / answers. Returns its base URL.
async fn start(runner: Arc<ScriptedRunner>) -> String {
    let port = free_port();
    let mut config = Config::default();
    config.server.bind = "127.0.0.1".to_string();
    config.server.port = port;
    config.network.script_path = "/opt/fabric-samples/test-network/network.sh".to_string();

    tokio::spawn(async move {
        let _ = api::run_server_with_runner(config, runner).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/", base)).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("controller on {} did not become healthy within 5s", base);
}

async fn post(base: &str, path: &str, body: Option<Value>) -> (u16, Value) {
    let client = reqwest::Client::new();
    let mut req = client.post(format!("{}{}", base, path));
    if let Some(b) = body {
        req = req.json(&b);
    }
    let resp = req.send().await.expect("send");
    let status = resp.status().as_u16();
    let json: Value = resp.json().await.expect("parse JSON");
    (status, json)
}

fn failed() -> ExitState {
    ExitState::Failed {
        code: Some(1),
        description: "exit status: 1".to_string(),
    }
}

#[tokio::test]
async fn health_responds_with_running() {
    let base = start(Arc::new(ScriptedRunner::new())).await;
    let json: Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("get")
        .json()
        .await
        .expect("json");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
}

#[tokio::test]
async fn network_up_success_returns_output() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.push_result(ExitState::Success, "Creating network \"fabric_test\"\n");
    let base = start(runner.clone()).await;

    let (status, json) = post(&base, "/network/up", None).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "success");
    assert_eq!(json["message"], "Creating network \"fabric_test\"\n");

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.args, vec!["up"]);
    assert!(calls[0].1 <= Duration::from_secs(120));
    assert!(calls[0].1 > Duration::from_secs(119));
}

#[tokio::test]
async fn deploy_defaults_reach_the_script() {
    let runner = Arc::new(ScriptedRunner::new());
    let base = start(runner.clone()).await;

    let (status, _) = post(
        &base,
        "/chaincode/deploy",
        Some(json!({"name": "asset", "path": "./cc", "language": "go"})),
    )
    .await;
    assert_eq!(status, 200);
    let calls = runner.calls();
    assert_eq!(
        calls[0].0.args,
        vec!["deployCC", "-ccn", "asset", "-ccp", "./cc", "-ccl", "go", "-ccv", "1.0", "-c", "mychannel"]
    );
    assert!(calls[0].1 <= Duration::from_secs(300));
    assert!(calls[0].1 > Duration::from_secs(299));
}

#[tokio::test]
async fn redeploy_with_marker_is_success() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.push_result(
        failed(),
        "Query chaincode definition successful on peer0.org1 on channel 'mychannel'\nError: exit 1",
    );
    let base = start(runner).await;

    let (status, json) = post(
        &base,
        "/chaincode/deploy",
        Some(json!({"name": "basic", "path": "../asset-transfer-basic/chaincode-go", "language": "go"})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "success");
}

#[tokio::test]
async fn invoke_missing_function_is_400_and_never_runs() {
    let runner = Arc::new(ScriptedRunner::new());
    let base = start(runner.clone()).await;

    let (status, json) = post(
        &base,
        "/chaincode/invoke",
        Some(json!({"channel": "mychannel", "chaincode": "basic", "args": []})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(json["status"], "error");
    assert!(json["message"].as_str().unwrap().contains("function"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn malformed_json_is_400() {
    let runner = Arc::new(ScriptedRunner::new());
    let base = start(runner.clone()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/chaincode/query", base))
        .header("content-type", "application/json")
        .body("{\"channel\":")
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 400);
    let json: Value = resp.json().await.expect("json");
    assert_eq!(json["status"], "error");
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn wrong_method_is_405_json() {
    let base = start(Arc::new(ScriptedRunner::new())).await;
    let resp = reqwest::get(format!("{}/network/up", base)).await.expect("get");
    assert_eq!(resp.status().as_u16(), 405);
    let json: Value = resp.json().await.expect("json");
    assert_eq!(json, json!({"status": "error", "message": "Method not allowed"}));
}

#[tokio::test]
async fn invoke_failure_is_500_with_output_and_error() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.push_result(failed(), "Error: endorsement failure during invoke");
    let base = start(runner.clone()).await;

    let (status, json) = post(
        &base,
        "/chaincode/invoke",
        Some(json!({"channel": "mychannel", "chaincode": "basic", "function": "InitLedger", "args": []})),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(
        json["message"],
        "Error: endorsement failure during invoke\nError: exit status: 1"
    );
    let args = &runner.calls()[0].0.args;
    assert_eq!(args.last().unwrap(), r#"{"function":"InitLedger","Args":[]}"#);
}

#[tokio::test]
async fn timeout_is_500_even_with_marker() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.push_result(
        ExitState::TimedOut {
            after: Duration::from_secs(120),
        },
        "Chaincode definition committed",
    );
    let base = start(runner).await;

    let (status, json) = post(&base, "/channel/create", Some(json!({"channel": "trade"}))).await;
    assert_eq!(status, 500);
    assert!(json["message"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn spawn_failure_is_500() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.push(Scripted::SpawnFailure(
        "failed to start docker: No such file or directory".to_string(),
    ));
    let base = start(runner).await;

    let (status, json) = post(
        &base,
        "/chaincode/query",
        Some(json!({"channel": "mychannel", "chaincode": "basic", "function": "GetAllAssets"})),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn channel_create_accepts_empty_body() {
    let runner = Arc::new(ScriptedRunner::new());
    let base = start(runner.clone()).await;
    let (status, _) = post(&base, "/channel/create", None).await;
    assert_eq!(status, 200);
    assert_eq!(runner.calls()[0].0.args, vec!["createChannel", "-c", "mychannel"]);
}

#[tokio::test]
async fn client_round_trip() {
    use hlf_controller::client::{CallParams, ControllerClient};

    let runner = Arc::new(ScriptedRunner::new());
    runner.push_result(ExitState::Success, "[{\"ID\":\"asset1\"}]");
    let base = start(runner.clone()).await;

    let client = ControllerClient::new(Some(base)).expect("client");
    let resp = client
        .query(&CallParams {
            channel: "mychannel".into(),
            chaincode: "basic".into(),
            function: "GetAllAssets".into(),
            args: vec![],
        })
        .await
        .expect("query");
    assert!(resp.is_success());
    assert_eq!(resp.message, "[{\"ID\":\"asset1\"}]");
    assert_eq!(runner.calls()[0].0.program, "docker");
}
