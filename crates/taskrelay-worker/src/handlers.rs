//! The built-in handler set, one per supported task type.
//!
//! These model the latency and result shapes of real work; the bodies are
//! simulations. Missing payload fields degrade to empty values rather than
//! erroring, matching how lenient the producers of these payloads are.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use taskrelay_core::{HandlerRegistry, RegistryError, TaskHandler, TaskType};

/// Assemble the full dispatch table. Called once at startup.
pub fn registry() -> Result<HandlerRegistry, RegistryError> {
    let mut registry = HandlerRegistry::new();
    registry.register(TaskType::new("email"), Arc::new(EmailHandler))?;
    registry.register(TaskType::new("data"), Arc::new(DataHandler))?;
    registry.register(TaskType::new("file"), Arc::new(FileHandler))?;
    registry.register(TaskType::new("api"), Arc::new(ApiHandler))?;
    registry.register(TaskType::new("script"), Arc::new(ScriptHandler))?;
    registry.register(TaskType::new("report"), Arc::new(ReportHandler))?;
    Ok(registry)
}

fn str_field<'a>(payload: &'a Value, name: &str) -> &'a str {
    payload[name].as_str().unwrap_or_default()
}

/// Email delivery simulation.
pub struct EmailHandler;

const EMAIL_DELAY: Duration = Duration::from_secs(2);

#[async_trait]
impl TaskHandler for EmailHandler {
    async fn handle(&self, payload: &Value) -> Result<Value, String> {
        let recipient = str_field(payload, "recipient");
        let subject = str_field(payload, "subject");
        tracing::info!(recipient, subject, "sending email");

        tokio::time::sleep(EMAIL_DELAY).await;

        Ok(json!({
            "status": "sent",
            "recipient": recipient,
            "timestamp": Utc::now().timestamp(),
        }))
    }
}

/// Data manipulation: sum / average / count over `payload["data"]`.
pub struct DataHandler;

const DATA_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
impl TaskHandler for DataHandler {
    async fn handle(&self, payload: &Value) -> Result<Value, String> {
        let operation = str_field(payload, "operation").to_string();
        let data = payload["data"].as_array().cloned().unwrap_or_default();
        tracing::info!(operation = %operation, items = data.len(), "processing data operation");

        let result = match operation.as_str() {
            "sum" => sum_of(&data),
            "average" => {
                if data.is_empty() {
                    json!(0)
                } else {
                    json!(float_total(&data) / data.len() as f64)
                }
            }
            "count" => json!(data.len()),
            // unrecognized operation: echo the input back
            _ => Value::Array(data.clone()),
        };

        tokio::time::sleep(DATA_DELAY).await;

        Ok(json!({
            "operation": operation,
            "result": result,
            "items_processed": data.len(),
        }))
    }
}

/// Integer sum when every element is integral, float sum otherwise.
fn sum_of(data: &[Value]) -> Value {
    let ints: Option<Vec<i64>> = data.iter().map(Value::as_i64).collect();
    match ints {
        Some(ints) => json!(ints.iter().sum::<i64>()),
        None => json!(float_total(data)),
    }
}

fn float_total(data: &[Value]) -> f64 {
    data.iter().filter_map(Value::as_f64).sum()
}

/// File operation simulation.
pub struct FileHandler;

const FILE_DELAY: Duration = Duration::from_secs(3);

#[async_trait]
impl TaskHandler for FileHandler {
    async fn handle(&self, payload: &Value) -> Result<Value, String> {
        let operation = str_field(payload, "operation");
        let file_path = str_field(payload, "file_path");
        tracing::info!(operation, file_path, "processing file operation");

        tokio::time::sleep(FILE_DELAY).await;

        Ok(json!({
            "operation": operation,
            "file_path": file_path,
            "status": "completed",
            "size_bytes": 1024,
        }))
    }
}

/// Outbound API call simulation.
pub struct ApiHandler;

const API_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
impl TaskHandler for ApiHandler {
    async fn handle(&self, payload: &Value) -> Result<Value, String> {
        let url = str_field(payload, "url");
        let method = payload["method"].as_str().unwrap_or("GET");
        tracing::info!(method, url, "calling api");

        tokio::time::sleep(API_DELAY).await;

        Ok(json!({
            "status_code": 200,
            "url": url,
            "method": method,
        }))
    }
}

/// Script execution simulation.
pub struct ScriptHandler;

const SCRIPT_DELAY: Duration = Duration::from_secs(5);

#[async_trait]
impl TaskHandler for ScriptHandler {
    async fn handle(&self, payload: &Value) -> Result<Value, String> {
        let script_name = str_field(payload, "script_name");
        let args = payload["args"].as_array().cloned().unwrap_or_default();
        tracing::info!(script_name, args = ?args, "executing script");

        tokio::time::sleep(SCRIPT_DELAY).await;

        Ok(json!({
            "script": script_name,
            "args": args,
            "exit_code": 0,
            "output": "Script executed successfully",
        }))
    }
}

/// Report generation simulation.
pub struct ReportHandler;

const REPORT_DELAY: Duration = Duration::from_secs(10);

#[async_trait]
impl TaskHandler for ReportHandler {
    async fn handle(&self, payload: &Value) -> Result<Value, String> {
        let report_type = str_field(payload, "report_type");
        tracing::info!(report_type, "generating report");

        tokio::time::sleep(REPORT_DELAY).await;

        Ok(json!({
            "report_type": report_type,
            "status": "generated",
            "file_url": format!("/reports/{}_{}.pdf", report_type, Utc::now().timestamp()),
            "pages": 42,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taskrelay_core::domain::{AttemptKey, TaskStatus};
    use taskrelay_core::impls::{InMemoryQueue, InMemoryStatusStore};
    use taskrelay_core::{StatusStore, Worker, WorkerConfig, WorkerId};
    use tokio::sync::watch;

    #[test]
    fn registry_has_all_six_task_types() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), 6);
        for task_type in ["email", "data", "file", "api", "script", "report"] {
            assert!(
                registry.get(&TaskType::new(task_type)).is_some(),
                "missing handler for {task_type}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn data_sum_of_integers_yields_an_integer() {
        let result = DataHandler
            .handle(&json!({"operation": "sum", "data": [1, 2, 3]}))
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({"operation": "sum", "result": 6, "items_processed": 3})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn data_average_of_empty_input_is_zero() {
        let result = DataHandler
            .handle(&json!({"operation": "average", "data": []}))
            .await
            .unwrap();
        assert_eq!(result["result"], json!(0));
        assert_eq!(result["items_processed"], json!(0));
    }

    #[tokio::test(start_paused = true)]
    async fn data_average_of_integers_is_a_float() {
        let result = DataHandler
            .handle(&json!({"operation": "average", "data": [1, 2, 3, 4]}))
            .await
            .unwrap();
        assert_eq!(result["result"], json!(2.5));
    }

    #[tokio::test(start_paused = true)]
    async fn data_count_counts_items() {
        let result = DataHandler
            .handle(&json!({"operation": "count", "data": ["a", "b"]}))
            .await
            .unwrap();
        assert_eq!(result["result"], json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn data_unknown_operation_echoes_the_input() {
        let result = DataHandler
            .handle(&json!({"operation": "shuffle", "data": [3, 1]}))
            .await
            .unwrap();
        assert_eq!(result["result"], json!([3, 1]));
    }

    #[tokio::test(start_paused = true)]
    async fn email_reports_sent_with_the_recipient() {
        let result = EmailHandler
            .handle(&json!({"recipient": "ops@example.com", "subject": "hi"}))
            .await
            .unwrap();
        assert_eq!(result["status"], json!("sent"));
        assert_eq!(result["recipient"], json!("ops@example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn script_reports_a_clean_exit() {
        let result = ScriptHandler
            .handle(&json!({"script_name": "cleanup.sh", "args": ["--all"]}))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], json!(0));
        assert_eq!(result["script"], json!("cleanup.sh"));
        assert_eq!(result["args"], json!(["--all"]));
    }

    // End-to-end through the worker loop with the real dispatch table.

    async fn wait_for_terminal(
        store: &InMemoryStatusStore,
        key: &AttemptKey,
    ) -> taskrelay_core::TaskRecord {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(600);
        loop {
            if let Some(record) = store.get(key).await.unwrap() {
                if record.status.is_terminal() {
                    return record;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {key}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn data_task_runs_to_completed_end_to_end() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let store = Arc::new(InMemoryStatusStore::new());
        let worker = Worker::new(
            queue.clone(),
            store.clone(),
            Arc::new(registry().unwrap()),
            WorkerId::generate(),
            WorkerConfig::default(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move { worker.run(shutdown_rx).await });

        queue
            .send(r#"{"task_id":"t1","type":"data","payload":{"operation":"sum","data":[1,2,3]}}"#)
            .await;

        let record = wait_for_terminal(&store, &AttemptKey::new("t1", 1)).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(
            record.result,
            Some(json!({"operation": "sum", "result": 6, "items_processed": 3}))
        );
        assert!(queue.is_empty().await);

        shutdown_tx.send(true).unwrap();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn bogus_task_type_fails_and_stays_queued() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let store = Arc::new(InMemoryStatusStore::new());
        let worker = Worker::new(
            queue.clone(),
            store.clone(),
            Arc::new(registry().unwrap()),
            WorkerId::generate(),
            WorkerConfig::default(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move { worker.run(shutdown_rx).await });

        queue
            .send(r#"{"task_id":"t2","type":"bogus","payload":{}}"#)
            .await;

        let record = wait_for_terminal(&store, &AttemptKey::new("t2", 1)).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error_message.as_deref().unwrap().contains("bogus"));
        assert_eq!(queue.len().await, 1);

        shutdown_tx.send(true).unwrap();
        join.await.unwrap();
    }
}
