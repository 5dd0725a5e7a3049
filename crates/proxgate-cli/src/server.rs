use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use proxgate_core::protocol::{self, ToolRequest, ToolResponse};
use proxgate_runtime::Gateway;

use crate::tools;

/// Serve newline-delimited tool calls on stdin/stdout until EOF.
pub async fn serve(gateway: Gateway) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_io(gateway, stdin, tokio::io::stdout()).await?;
    Ok(())
}

/// Serve over any line reader and writer. Returns the writer after EOF
/// once every in-flight call has answered.
///
/// Each request runs as its own task so a slow cluster call does not hold
/// up the rest; responses may therefore come back out of order and are
/// matched by `id`. Lines are read as raw bytes and capped at
/// [`protocol::MAX_LINE_SIZE`]; a bad line gets a `bad_request` answer and
/// the server keeps reading.
pub async fn serve_io<R, W>(gateway: Gateway, mut reader: R, writer: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let mut in_flight = JoinSet::new();
    let mut line = Vec::new();

    info!(gate = gateway.gate().is_enabled(), "Tool server ready");

    loop {
        line.clear();
        let read = (&mut reader)
            .take(protocol::MAX_LINE_SIZE as u64 + 1)
            .read_until(b'\n', &mut line)
            .await
            .with_context(|| "Failed to read request line")?;
        if read == 0 {
            break;
        }
        reap_finished(&mut in_flight);

        if line.last() != Some(&b'\n') && line.len() > protocol::MAX_LINE_SIZE {
            warn!(code = "bad_request", max = protocol::MAX_LINE_SIZE, "Rejected oversized request line");
            discard_line(&mut reader)
                .await
                .with_context(|| "Failed to skip oversized request line")?;
            write_response(&writer, &protocol::oversized_request()).await?;
            continue;
        }

        let request = line.trim_ascii();
        if request.is_empty() {
            continue;
        }
        match protocol::decode_request(request) {
            Ok(request) => {
                let gw = gateway.clone();
                let out = writer.clone();
                in_flight.spawn(async move {
                    let response = handle(&gw, request).await;
                    if let Err(e) = write_response(&out, &response).await {
                        warn!(error = %e, "Failed to write response");
                    }
                });
            }
            Err(response) => {
                warn!(code = "bad_request", "Rejected malformed request line");
                write_response(&writer, &response).await?;
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
    info!("Input closed, tool server stopping");

    let writer = Arc::try_unwrap(writer)
        .map_err(|_| anyhow::anyhow!("Response writer still shared after shutdown"))?;
    Ok(writer.into_inner())
}

/// Collect tasks that already finished so the set only holds live calls.
fn reap_finished(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.try_join_next() {
        log_join(joined);
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "Tool task aborted");
    }
}

/// Skip the rest of the current line without buffering it.
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let (found, used) = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, buf.len()),
            }
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

/// Execute one request. Failures become error responses, never faults.
pub async fn handle(gateway: &Gateway, request: ToolRequest) -> ToolResponse {
    let started = Instant::now();
    let tool = request.tool.clone();
    match tools::invoke(gateway, &request.tool, request.arguments).await {
        Ok(result) => {
            debug!(tool = %tool, elapsed_ms = started.elapsed().as_millis() as u64, "Tool call succeeded");
            ToolResponse::success(request.id, result)
        }
        Err(e) => {
            warn!(tool = %tool, code = e.code(), error = %e, "Tool call failed");
            ToolResponse::from_error(request.id, &e)
        }
    }
}

/// One response per line; the lock keeps concurrent writers from interleaving.
async fn write_response<W>(writer: &Mutex<W>, response: &ToolResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = protocol::encode_response(response);
    line.push('\n');
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes())
        .await
        .with_context(|| "Failed to write response")?;
    w.flush().await.with_context(|| "Failed to flush response")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxgate_core::gate::SafetyGate;
    use proxgate_runtime::mock::MockCluster;
    use proxgate_runtime::transport::Method;
    use serde_json::Value;
    use std::collections::HashMap;

    async fn run(mock: Arc<MockCluster>, input: impl AsRef<[u8]>) -> HashMap<String, Value> {
        let gw = Gateway::new(mock, SafetyGate::disabled());
        let out = serve_io(gw, input.as_ref(), Vec::new()).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| {
                let v: Value = serde_json::from_str(l).unwrap();
                (v["id"].to_string(), v)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_trip_and_error_isolation() {
        let mock = MockCluster::new()
            .with_nodes(&[("pve1", "online")])
            .into_arc();
        let input = concat!(
            r#"{"id": 1, "tool": "get_nodes"}"#,
            "\n",
            "this is not json\n",
            "\n",
            r#"{"id": "x", "tool": "pause_vm", "arguments": {"node": "pve1", "vmid": 100}}"#,
            "\n",
            r#"{"id": 3, "tool": "delete_snapshot", "arguments": {"node": "pve1", "vmid": 100, "name": "a"}}"#,
            "\n",
        );
        let responses = run(mock.clone(), input).await;
        assert_eq!(responses.len(), 4);

        let nodes = &responses["1"];
        assert_eq!(nodes["ok"], true);
        assert_eq!(nodes["result"][0]["node"], "pve1");

        let bad = &responses["null"];
        assert_eq!(bad["ok"], false);
        assert_eq!(bad["error"]["code"], "bad_request");

        assert_eq!(responses["\"x\""]["error"]["code"], "invalid_action");
        assert_eq!(responses["3"]["error"]["code"], "safety_gate_rejected");

        // Only get_nodes reached the cluster.
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_eof_with_no_input() {
        let responses = run(MockCluster::new().into_arc(), "").await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_is_a_response() {
        let mock = MockCluster::new()
            .on_error(
                Method::Get,
                "/nodes/pve1/status",
                proxgate_core::error::GatewayError::UpstreamApi {
                    status: Some(595),
                    message: "no such node".to_string(),
                },
            )
            .into_arc();
        let responses = run(
            mock,
            "{\"id\": 9, \"tool\": \"get_node_status\", \"arguments\": {\"node\": \"pve1\"}}\n",
        )
        .await;
        let r = &responses["9"];
        assert_eq!(r["error"]["code"], "upstream_api_error");
        assert!(r["error"]["message"].as_str().unwrap().contains("no such node"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_server() {
        let mock = MockCluster::new()
            .with_nodes(&[("pve1", "online")])
            .into_arc();
        let responses = run(
            mock.clone(),
            b"\xff\xfe garbage\n{\"id\":1,\"tool\":\"get_nodes\"}\n",
        )
        .await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses["null"]["error"]["code"], "bad_request");
        assert_eq!(responses["1"]["ok"], true);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_and_skipped() {
        let mock = MockCluster::new()
            .with_nodes(&[("pve1", "online")])
            .into_arc();
        let mut input = vec![b'x'; protocol::MAX_LINE_SIZE * 2];
        input.extend_from_slice(b"\n{\"id\":2,\"tool\":\"get_nodes\"}\n");

        let responses = run(mock, input).await;
        assert_eq!(responses.len(), 2);
        let rejected = &responses["null"];
        assert_eq!(rejected["error"]["code"], "bad_request");
        assert!(rejected["error"]["message"].as_str().unwrap().contains("too large"));
        assert_eq!(responses["2"]["ok"], true);
    }

    #[tokio::test]
    async fn test_oversized_line_at_eof() {
        let input = vec![b'x'; protocol::MAX_LINE_SIZE + 1];
        let responses = run(MockCluster::new().into_arc(), input).await;
        assert_eq!(responses["null"]["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_finished_tasks_are_reaped() {
        let mut set = JoinSet::new();
        for _ in 0..8 {
            set.spawn(async {});
        }
        for _ in 0..100 {
            if set.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
            reap_finished(&mut set);
        }
        assert!(set.is_empty());
    }
}
