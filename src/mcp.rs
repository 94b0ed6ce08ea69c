//! MCP (Model Context Protocol) JSON-RPC handler.
//!
//! Reads JSON-RPC 2.0 requests from stdin (one per line) and writes
//! responses to stdout, one per line.
//!
//! ## Supported methods
//!
//! | Method              | Description                      |
//! |---------------------|----------------------------------|
//! | `initialize`        | Handshake, returns capabilities  |
//! | `tools/list`        | List available tool definitions  |
//! | `tools/call`        | Execute a tool and return result |
//! | `ping`              | Liveness check                   |
//!
//! Notifications (requests without an `id`) never get a response.
//!
//! `tools/call` requests run as independent tasks, so a slow vendor call does
//! not hold up the rest of the stream. Responses may therefore be written out
//! of request order; each carries the id of its request. All output goes
//! through a single writer task, one whole line at a time.

use std::io;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::api::EightSleepApi;
use crate::tools;

const SERVER_NAME: &str = "eight-sleep-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;

/// Run the MCP server on stdio, processing JSON-RPC requests until EOF.
pub async fn run_stdio(api: Arc<EightSleepApi>) {
    let reader = BufReader::new(tokio::io::stdin());
    if let Err(e) = serve(reader, tokio::io::stdout(), api).await {
        warn!("{e}");
    }
}

/// Serve requests from `reader` until EOF, writing responses to `writer`.
///
/// Returns the writer once every in-flight tool call has answered.
pub async fn serve<R, W>(mut reader: R, writer: W, api: Arc<EightSleepApi>) -> io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let mut in_flight = JoinSet::new();
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                warn!("stdin read error: {e}");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                send(&tx, error_response(Value::Null, PARSE_ERROR, format!("Parse error: {e}")));
                continue;
            }
        };

        let id = request.get("id").cloned();
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let Some(id) = id else {
            match method.as_str() {
                "notifications/initialized" | "notifications/cancelled" => {}
                _ => debug!("ignoring notification: {method}"),
            }
            continue;
        };

        match method.as_str() {
            "initialize" => send(&tx, inject_id(handle_initialize(&request), id)),
            "tools/list" => send(&tx, inject_id(handle_tools_list(), id)),
            "tools/call" => {
                let api = Arc::clone(&api);
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let response = handle_tools_call(&request, &api).await;
                    send(&tx, inject_id(response, id));
                });
            }
            "ping" => send(&tx, json!({ "jsonrpc": "2.0", "id": id, "result": {} })),
            _ => send(
                &tx,
                error_response(id, METHOD_NOT_FOUND, format!("Method not found: {method}")),
            ),
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            warn!("tool call task failed: {e}");
        }
    }
    drop(tx);

    writer_task
        .await
        .map_err(|e| io::Error::other(format!("response writer task failed: {e}")))
}

/// Handle `initialize`: return protocol version, capabilities, and server info.
fn handle_initialize(request: &Value) -> Value {
    if let Some(client) = request.pointer("/params/clientInfo/name").and_then(Value::as_str) {
        info!("client connected: {client}");
    }
    json!({
        "jsonrpc": "2.0",
        "result": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        }
    })
}

fn handle_tools_list() -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": {
            "tools": tools::tool_definitions()
        }
    })
}

/// Handle `tools/call`: dispatch to the tool handler and wrap its content.
async fn handle_tools_call(request: &Value, api: &EightSleepApi) -> Value {
    let params = request.get("params").cloned().unwrap_or(json!({}));
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let result = tools::handle_tool_call(name, &args, api).await;

    let mut response_result = json!({
        "content": result.content
    });
    if result.is_error {
        response_result["isError"] = json!(true);
    }

    json!({
        "jsonrpc": "2.0",
        "result": response_result
    })
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Inject the request `id` into a response object.
fn inject_id(mut response: Value, id: Value) -> Value {
    response["id"] = id;
    response
}

fn send(tx: &mpsc::UnboundedSender<Value>, response: Value) {
    if tx.send(response).is_err() {
        warn!("response dropped: writer closed");
    }
}

/// Drain `rx`, writing each response as one line and flushing after each.
async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>) -> W
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut output = serde_json::to_string(&response).unwrap_or_default();
        output.push('\n');
        if let Err(e) = writer.write_all(output.as_bytes()).await {
            warn!("stdout write error: {e}");
        }
        if let Err(e) = writer.flush().await {
            warn!("stdout flush error: {e}");
        }
    }
    writer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EightSleepClient;
    use crate::config::{ApiConfig, Credentials};
    use httpmock::prelude::*;

    fn api_for(server: &MockServer) -> Arc<EightSleepApi> {
        let creds = Credentials {
            email: "a@b.c".into(),
            password: "hunter2".into(),
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            user_id: String::new(),
        };
        let cfg = ApiConfig {
            api_url: server.url("/v1"),
            auth_url: server.url("/tokens"),
            timezone: "UTC".into(),
            timeout_secs: 5,
        };
        Arc::new(EightSleepApi::new(EightSleepClient::new(creds, &cfg).unwrap(), "UTC"))
    }

    async fn run(input: &str, api: Arc<EightSleepApi>) -> Vec<Value> {
        let out = serve(input.as_bytes(), Vec::new(), api).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn by_id(responses: &[Value], id: i64) -> &Value {
        responses
            .iter()
            .find(|r| r["id"] == json!(id))
            .unwrap_or_else(|| panic!("no response for id {id}: {responses:?}"))
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let server = MockServer::start();
        let input = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"clientInfo":{"name":"test"}}}"#;
        let responses = run(&format!("{input}\n"), api_for(&server)).await;
        assert_eq!(responses.len(), 1);
        let result = &responses[0]["result"];
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_matches_definitions() {
        let server = MockServer::start();
        let responses = run(
            "{\"jsonrpc\":\"2.0\",\"id\":\"abc\",\"method\":\"tools/list\"}\n",
            api_for(&server),
        )
        .await;
        assert_eq!(responses[0]["id"], "abc");
        let listed = responses[0]["result"]["tools"].as_array().unwrap();
        assert_eq!(listed.len(), tools::tool_definitions().len());
    }

    #[tokio::test]
    async fn parse_error_then_continues() {
        let server = MockServer::start();
        let input = "not json\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let responses = run(input, api_for(&server)).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn unknown_method_and_notifications() {
        let server = MockServer::start();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"something/else\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"resources/list\"}\n",
        );
        let responses = run(input, api_for(&server)).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 3);
        assert_eq!(responses[0]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(responses[0]["error"]["message"], "Method not found: resources/list");
    }

    #[tokio::test]
    async fn tool_errors_are_results_not_rpc_errors() {
        let server = MockServer::start();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"tools/call\",",
            "\"params\":{\"name\":\"set_temperature\",\"arguments\":{\"level\":-150}}}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"tools/call\",",
            "\"params\":{\"name\":\"nope\"}}\n",
        );
        let responses = run(input, api_for(&server)).await;
        assert_eq!(responses.len(), 2);

        let bad_level = by_id(&responses, 4);
        assert!(bad_level.get("error").is_none());
        assert_eq!(bad_level["result"]["isError"], true);
        let text = bad_level["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Invalid argument"), "{text}");

        let unknown = by_id(&responses, 5);
        assert_eq!(unknown["result"]["isError"], true);
        assert_eq!(unknown["result"]["content"][0]["text"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn in_flight_calls_finish_after_eof() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tokens");
            then.status(200)
                .json_body(json!({ "access_token": "t", "userId": "u1" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/users/u1/temperature");
            then.status(200)
                .delay(std::time::Duration::from_millis(100))
                .json_body(json!({ "currentLevel": 20, "currentState": { "type": "smart", "level": 10 } }));
        });

        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":6,\"method\":\"tools/call\",",
            "\"params\":{\"name\":\"get_temperature\",\"arguments\":{}}}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n",
        );
        let responses = run(input, api_for(&server)).await;
        assert_eq!(responses.len(), 2);
        // The slow tool call answers after the ping.
        assert_eq!(responses[0]["id"], 7);

        let temp = by_id(&responses, 6);
        assert!(temp["result"].get("isError").is_none());
        let text = temp["result"]["content"][0]["text"].as_str().unwrap();
        let state: Value = serde_json::from_str(text).unwrap();
        assert_eq!(state["target_level"], 20);
        assert_eq!(state["current_level"], 10);
        assert_eq!(state["heating"], true);
    }
}
