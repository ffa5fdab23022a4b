//! End-to-end flows through the public client API against a mock control plane.

use bcc_client::{
    Arguments, CancellationToken, Credentials, DirectorySink, Manager, ManagerConfig, Page,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct Vm {
    id: String,
    name: String,
}

fn config(server: &MockServer) -> ManagerConfig {
    ManagerConfig::new(server.uri())
        .unwrap()
        .with_request_interval(20)
        .with_task_poll_interval(10)
        .with_lock_poll_interval(10)
}

fn vms(range: std::ops::Range<usize>) -> Vec<serde_json::Value> {
    range
        .map(|n| json!({"id": format!("vm-{n}"), "name": format!("node{n}")}))
        .collect()
}

#[tokio::test]
async fn collects_every_page_in_order() {
    let server = MockServer::start().await;
    for (page, range) in [("1", 0..10), ("2", 10..20), ("3", 20..25)] {
        Mock::given(method("GET"))
            .and(path("/v1/vm"))
            .and(query_param("page", page))
            .and(query_param("vdc", "vdc-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 25,
                "limit": 10,
                "items": vms(range),
            })))
            .expect(if page == "3" { 2 } else { 1 })
            .mount(&server)
            .await;
    }

    let manager = Manager::builder(Credentials::new("token"))
        .with_config(config(&server))
        .build()
        .unwrap();

    let args = Arguments::new().with("vdc", "vdc-1");
    let all: Vec<Vm> = manager
        .collect(&CancellationToken::new(), "v1/vm", &args)
        .await
        .unwrap();

    assert_eq!(all.len(), 25);
    for (n, vm) in all.iter().enumerate() {
        assert_eq!(vm.id, format!("vm-{n}"));
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    // single-page fetch of the last page
    let last: Page<Vm> = manager
        .get_page(&CancellationToken::new(), "v1/vm", &args, 3)
        .await
        .unwrap();
    assert_eq!(last.total, 25);
    assert_eq!(last.items.len(), 5);
}

#[tokio::test]
async fn create_retries_lock_then_waits_for_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/vm"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error_alias": ["object_locked"],
            "non_field_errors": ["locked"],
            "details": []
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/vm"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Esu-Tasks", "job-1")
                .set_body_json(json!({"id": "vm-1", "name": "web"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/job/job-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "in-progress", "name": "boot"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/job/job-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "done", "name": "boot"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/vm/vm-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "vm-1", "locked": false})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Manager::builder(Credentials::new("token"))
        .with_config(config(&server))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let vm: Vm = manager
        .mutate(&cancel, Method::POST, "v1/vm", &json!({"name": "web"}))
        .await
        .unwrap();
    assert_eq!(
        vm,
        Vm {
            id: "vm-1".to_string(),
            name: "web".to_string()
        }
    );

    manager.wait_unlocked(&cancel, "v1/vm/vm-1").await.unwrap();

    let received = server.received_requests().await.unwrap();
    let posts = received.iter().filter(|r| r.method.as_str() == "POST").count();
    let polls = received
        .iter()
        .filter(|r| r.url.path() == "/v1/job/job-1")
        .count();
    assert_eq!(posts, 2);
    assert_eq!(polls, 2);
}

#[tokio::test]
async fn kubeconfig_lands_in_directory() {
    let server = MockServer::start().await;
    let yaml = "apiVersion: v1\nkind: Config\ncurrent-context: c7\n";
    Mock::given(method("GET"))
        .and(path("/v1/kubernetes/c7/config"))
        .respond_with(ResponseTemplate::new(200).set_body_string(yaml))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manager = Manager::builder(Credentials::new("token"))
        .with_config(config(&server))
        .with_kubeconfig_sink(DirectorySink::new(dir.path()))
        .build()
        .unwrap();

    let nothing: Option<serde_json::Value> = manager
        .get(&CancellationToken::new(), "v1/kubernetes/c7/config", &Arguments::new())
        .await
        .unwrap();
    assert!(nothing.is_none());

    let written = std::fs::read_to_string(dir.path().join("kubectl-c7.yaml")).unwrap();
    assert_eq!(written, yaml);
}
