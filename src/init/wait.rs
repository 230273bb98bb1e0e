// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tower::BoxError;
use tracing::error;

/// Joins every task in the set, giving up once `timeout` has passed. The last task
/// error, if any, is returned.
pub async fn wait_for_tasks_with_timeout(
    tasks: &mut JoinSet<Result<(), BoxError>>,
    timeout: Duration,
) -> Result<(), BoxError> {
    wait_for_tasks_with_deadline(tasks, Instant::now() + timeout).await
}

pub async fn wait_for_tasks_with_deadline(
    tasks: &mut JoinSet<Result<(), BoxError>>,
    stop_at: Instant,
) -> Result<(), BoxError> {
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                tasks.abort_all();
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(v)) => match v {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => {
                    error!("Failed to join with task: {:?}", e)
                }
            },
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_task_errors() {
        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        tasks.spawn(async { Ok(()) });
        tasks.spawn(async { Err("task failed".into()) });

        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_secs(1)).await;
        assert_eq!("task failed", res.unwrap_err().to_string());
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn times_out() {
        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        tasks.spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });

        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(20)).await;
        assert!(res.unwrap_err().to_string().contains("timed out"));
    }
}
