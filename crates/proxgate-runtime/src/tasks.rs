use tracing::debug;

use proxgate_core::error::Result;
use proxgate_core::task::{TaskHandle, TaskLogLine, TaskStatus};

use crate::api::ClusterApi;

/// Point-in-time reads of asynchronous cluster tasks.
///
/// No polling loop lives here: callers re-invoke at whatever interval they
/// need to observe completion.
#[derive(Clone)]
pub struct TaskTracker {
    api: ClusterApi,
}

impl TaskTracker {
    pub fn new(api: ClusterApi) -> Self {
        Self { api }
    }

    /// Build a handle, taking the node from the UPID when not supplied.
    pub fn handle(upid: &str, node: Option<&str>) -> Result<TaskHandle> {
        match node {
            Some(node) => Ok(TaskHandle::new(node, upid)),
            None => TaskHandle::from_upid(upid),
        }
    }

    pub async fn status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let status = self.api.task_status(handle).await?;
        debug!(upid = %handle.upid, status = %status.status, "Fetched task status");
        Ok(status)
    }

    pub async fn log(
        &self,
        handle: &TaskHandle,
        start: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<TaskLogLine>> {
        self.api.task_log(handle, start, limit).await
    }
}
