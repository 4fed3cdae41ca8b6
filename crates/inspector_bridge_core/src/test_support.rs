//! Scripted inspector peer and sample payloads shared by the unit tests.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::future::Future;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};

pub(crate) type PeerSocket = WebSocketStream<TcpStream>;

/// Accepts exactly one client on an ephemeral port and hands the socket to `script`.
pub(crate) async fn spawn_peer<F, Fut>(script: F) -> String
where
    F: FnOnce(PeerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept test client");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket handshake");
        script(ws).await;
    });

    format!("ws://{addr}")
}

/// Next command sent by the client, or `Value::Null` once it hangs up.
pub(crate) async fn next_command(ws: &mut PeerSocket) -> Value {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("client sent valid JSON");
        }
        if let Message::Close(_) = message {
            break;
        }
    }
    Value::Null
}

pub(crate) async fn send_json(ws: &mut PeerSocket, value: Value) {
    let _ = ws.send(Message::Text(value.to_string().into())).await;
}

pub(crate) async fn reply(ws: &mut PeerSocket, command: &Value, result: Value) {
    send_json(ws, json!({ "id": command["id"], "result": result })).await;
}

/// Two nodes: `(GC roots)` holding one 100-byte `Object` through a property edge.
pub(crate) fn sample_heap_value() -> Value {
    json!({
        "snapshot": {
            "meta": {
                "node_fields": ["type", "name", "id", "self_size", "edge_count", "trace_node_id"],
                "node_types": [
                    ["hidden", "array", "string", "object", "code", "closure",
                     "regexp", "number", "native", "synthetic"],
                    "string", "number", "number", "number", "number"
                ],
                "edge_fields": ["type", "name_or_index", "to_node"],
                "edge_types": [
                    ["context", "element", "property", "internal", "hidden", "shortcut", "weak"],
                    "string_or_number", "node"
                ]
            },
            "node_count": 2,
            "edge_count": 1
        },
        "nodes": [
            9, 0, 1, 0, 1, 0,
            3, 1, 2, 100, 0, 0
        ],
        "edges": [
            2, 2, 6
        ],
        "strings": ["(GC roots)", "Object", "myProperty"]
    })
}

/// Root with children `slowFunction` and `fastFunction`; ten samples.
pub(crate) fn sample_cpu_value() -> Value {
    json!({
        "startTime": 0,
        "endTime": 1_000_000,
        "nodes": [
            {
                "id": 1,
                "callFrame": {
                    "functionName": "(root)", "scriptId": "0", "url": "",
                    "lineNumber": -1, "columnNumber": -1
                },
                "hitCount": 3,
                "children": [2, 3]
            },
            {
                "id": 2,
                "callFrame": {
                    "functionName": "slowFunction", "scriptId": "1", "url": "file:///app.ts",
                    "lineNumber": 10, "columnNumber": 0
                },
                "hitCount": 5,
                "children": []
            },
            {
                "id": 3,
                "callFrame": {
                    "functionName": "fastFunction", "scriptId": 1, "url": "file:///app.ts",
                    "lineNumber": 20, "columnNumber": 0
                },
                "hitCount": 2,
                "children": []
            }
        ],
        "samples": [1, 2, 2, 2, 2, 2, 3, 3, 1, 1],
        "timeDeltas": [100, 100, 100, 100, 100, 100, 100, 100, 100, 100]
    })
}

/// Builds a snapshot payload with the standard six-field node layout.
///
/// Nodes are `[type, name, id, self_size, edge_count]` (trace id is always 0),
/// edges are `[type, name_or_index, target_ordinal]`; type indices follow
/// [`sample_heap_value`].
pub(crate) fn heap_value(nodes: &[[u64; 5]], edges: &[[u64; 3]], strings: &[&str]) -> Value {
    let meta = sample_heap_value()["snapshot"]["meta"].clone();

    let flat_nodes: Vec<u64> = nodes
        .iter()
        .flat_map(|[t, name, id, size, edge_count]| [*t, *name, *id, *size, *edge_count, 0])
        .collect();
    let flat_edges: Vec<u64> = edges
        .iter()
        .flat_map(|[t, name, to]| [*t, *name, *to * 6])
        .collect();

    json!({
        "snapshot": { "meta": meta },
        "nodes": flat_nodes,
        "edges": flat_edges,
        "strings": strings,
    })
}
