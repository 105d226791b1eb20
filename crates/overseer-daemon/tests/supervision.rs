//! End-to-end supervision flow over the in-process broker

use futures_util::StreamExt;
use overseer_daemon::broker::{DeliveryStream, Publication};
use overseer_daemon::{Context, DaemonConfig, Server};
use overseer_registry::WorkerQuery;
use overseer_types::{ResponseCommand, WorkerResponse, WorkerStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Daemon {
    context: Arc<Context>,
    responses: DeliveryStream,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    async fn start() -> Self {
        let config = DaemonConfig::default();
        let server = Server::with_context(config.clone(), Context::in_memory(&config));
        let (shutdown, rx) = watch::channel(false);
        let tasks = server.start(rx).await;
        let context = server.context();

        let responses = context
            .broker
            .subscribe(&context.exchange, "output.worker.#")
            .await
            .unwrap();

        Self {
            context,
            responses,
            shutdown,
            tasks,
        }
    }

    async fn send(&self, envelope: serde_json::Value) {
        self.context
            .broker
            .publish(
                &self.context.exchange,
                &self.context.inbound_key,
                Publication::transient(serde_json::to_vec(&envelope).unwrap()),
            )
            .await
            .unwrap();
    }

    async fn add(&self, uuid: &str, name: &str, version: i64, option: &str) {
        self.send(json!({
            "worker": {
                "uuid": uuid,
                "name": name,
                "hostname": "web-1",
                "version": version,
                "pid": 4242,
                "message": {"command": "add", "option": option}
            }
        }))
        .await;
    }

    async fn next_response(&mut self) -> WorkerResponse {
        let delivery = tokio::time::timeout(Duration::from_secs(2), self.responses.next())
            .await
            .expect("no response within timeout")
            .expect("response stream closed");
        let response: WorkerResponse = serde_json::from_slice(&delivery.body).unwrap();
        assert_eq!(delivery.routing_key, format!("output.worker.{}", response.uuid));
        response
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for task in self.tasks {
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .unwrap()
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_version_mode_admits_first_build_and_refuses_another() {
    let mut daemon = Daemon::start().await;

    daemon.add("A", "auth", 13, "version").await;
    let first = daemon.next_response().await;
    assert_eq!(first.uuid, "A");
    assert_eq!(first.command, ResponseCommand::Start);

    let stored = daemon
        .context
        .workers
        .find_one(&WorkerQuery::Uuid("A".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, WorkerStatus::Started);

    daemon.add("B", "auth", 14, "version").await;
    let second = daemon.next_response().await;
    assert_eq!(second.uuid, "B");
    assert_eq!(second.command, ResponseCommand::NoPermission);
    assert!(second.log.contains("version: 13"));
    assert!(daemon
        .context
        .workers
        .find_one(&WorkerQuery::Uuid("B".into()))
        .await
        .unwrap()
        .is_none());

    daemon.stop().await;
}

#[tokio::test]
async fn test_racing_one_mode_adds_have_single_winner() {
    let mut daemon = Daemon::start().await;

    daemon.add("A", "mailer", 1, "one").await;
    daemon.add("B", "mailer", 1, "one").await;

    let responses = [daemon.next_response().await, daemon.next_response().await];
    let started = responses.iter().filter(|r| r.is_start()).count();
    let refused = responses
        .iter()
        .filter(|r| r.command == ResponseCommand::NoPermission)
        .count();

    assert_eq!(started, 1);
    assert_eq!(refused, 1);
    assert_eq!(
        daemon
            .context
            .workers
            .count(&WorkerQuery::Name("mailer".into()))
            .await
            .unwrap(),
        1
    );

    daemon.stop().await;
}

#[tokio::test]
async fn test_many_mode_always_starts() {
    let mut daemon = Daemon::start().await;

    for uuid in ["A", "B", "C"] {
        daemon.add(uuid, "resize", 7, "many").await;
    }
    for _ in 0..3 {
        assert!(daemon.next_response().await.is_start());
    }

    assert_eq!(
        daemon
            .context
            .workers
            .count(&WorkerQuery::All)
            .await
            .unwrap(),
        3
    );

    daemon.stop().await;
}

#[tokio::test]
async fn test_heartbeats_and_monitor_samples_update_record() {
    let mut daemon = Daemon::start().await;

    daemon.add("A", "auth", 13, "many").await;
    daemon.next_response().await;

    daemon
        .send(json!({
            "worker": {
                "uuid": "A",
                "name": "auth",
                "version": 13,
                "pid": 5151,
                "message": {"command": "update", "option": ""}
            }
        }))
        .await;
    daemon
        .send(json!({"monitor": {"uuid": "A", "mem": 1024, "uptime": 60}}))
        .await;

    let mut updated = false;
    for _ in 0..50 {
        let stored = daemon
            .context
            .workers
            .find_one(&WorkerQuery::Uuid("A".into()))
            .await
            .unwrap()
            .unwrap();
        if stored.pid == 5151 && stored.monitor.mem == 1024 {
            updated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(updated);
    assert_eq!(
        daemon
            .context
            .workers
            .count(&WorkerQuery::All)
            .await
            .unwrap(),
        1
    );

    daemon.stop().await;
}

#[tokio::test]
async fn test_malformed_messages_do_not_stop_handling() {
    let mut daemon = Daemon::start().await;

    daemon
        .context
        .broker
        .publish(
            &daemon.context.exchange,
            &daemon.context.inbound_key,
            Publication::transient(b"{broken".to_vec()),
        )
        .await
        .unwrap();
    daemon.send(json!({})).await;
    daemon.add("A", "auth", 13, "bogus").await;

    daemon.add("B", "auth", 13, "version").await;
    let response = daemon.next_response().await;
    assert_eq!(response.uuid, "B");
    assert!(response.is_start());

    daemon.stop().await;
}
