//! Bootstrap flow: reconciliation driven by the backoff retrier against a
//! flaky risk service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rebalancer_runtime::retry::{RetryPolicy, retry_with_backoff};
use rebalancer_runtime::testing::{ScriptedChain, TEST_PRIVATE_KEY};
use rebalancer_runtime::{
    Allocation, BatchResult, PayloadExecutor, PortfolioReconciler, PortfolioSpec, RebalancerError,
    RiskClient,
};

const API_KEY: &str = "bootstrap-secret";

fn ok(res: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": true, "res": res }))
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(20), 2)
}

#[tokio::test]
async fn test_bootstrap_survives_transient_outage() {
    let server = MockServer::start().await;

    // Two failed listings before the service comes up.
    Mock::given(method("GET"))
        .and(path("/portfolio/my-portfolios"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/portfolio/my-portfolios"))
        .and(header("authorization", "Bearer bootstrap-secret"))
        .respond_with(ok(serde_json::json!({ "portfolios": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/portfolio/create"))
        .respond_with(ok(serde_json::json!({ "id": "main-portfolio" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/portfolio/activate"))
        .respond_with(ok(serde_json::json!("activated")))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = PortfolioReconciler::new(
        RiskClient::new(server.uri(), API_KEY),
        TEST_PRIVATE_KEY,
        "https://bot.example.com",
    );
    let spec = PortfolioSpec::default();

    let started = Instant::now();
    let portfolio = retry_with_backoff(policy(5), |_| reconciler.reconcile(&spec))
        .await
        .unwrap();

    assert_eq!(portfolio.id, "main-portfolio");
    assert_eq!(portfolio.is_active, Some(true));
    // 20ms + 40ms of backoff between the three attempts.
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_bootstrap_gives_up_after_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/portfolio/my-portfolios"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": false,
            "error": "maintenance"
        })))
        .expect(3)
        .mount(&server)
        .await;

    let reconciler = PortfolioReconciler::new(
        RiskClient::new(server.uri(), API_KEY),
        TEST_PRIVATE_KEY,
        "https://bot.example.com",
    );

    let spec = PortfolioSpec::default();
    let err = retry_with_backoff(policy(3), |_| reconciler.reconcile(&spec))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RebalancerError::Reconciliation { ref operation, ref message }
            if operation == "list" && message.contains("maintenance")
    ));
}

#[tokio::test]
async fn test_rebalance_event_payloads_execute_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/portfolio/submit-signed-transaction"))
        .respond_with(ok(serde_json::json!({ "hash": "0x01" })))
        .expect(3)
        .mount(&server)
        .await;

    let allocations: Vec<Allocation> = serde_json::from_value(serde_json::json!([
        { "beefyId": "pool-b", "status": "join", "payload": {
            "type": "poolJoin", "chainId": 42161,
            "to": "0x2222222222222222222222222222222222222222", "data": "0x02" } },
        { "beefyId": "pool-a", "status": "exit", "payload": {
            "type": "poolExit", "chainId": 42161,
            "to": "0x1111111111111111111111111111111111111111", "data": "0x01" } },
        { "beefyId": "pool-b", "status": "approve", "payload": {
            "type": "tokenApproveJoin", "chainId": 42161,
            "to": "0x3333333333333333333333333333333333333333", "data": "0x03", "value": "0x0" } }
    ]))
    .unwrap();

    let chain = Arc::new(ScriptedChain::new());
    let executor = PayloadExecutor::new(chain.clone(), RiskClient::new(server.uri(), API_KEY))
        .with_settlement_delay(Duration::ZERO);
    let result = executor.execute_batch(allocations).await;

    assert!(matches!(result, BatchResult::Completed { steps: 3, .. }));
    let signed: Vec<String> = chain
        .signed_data()
        .iter()
        .map(|d| format!("0x{}", hex::encode(d)))
        .collect();
    assert_eq!(signed, vec!["0x03", "0x01", "0x02"]);
}
