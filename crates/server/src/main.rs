mod config;
mod frame;

use annrec::{Artifacts, RecError, Recommender};
use anyhow::{Context, Result};
use config::ServerConfig;
use frame::{write_frame, FrameReader};
use serde_json::{json, Value as JsonValue};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

const MAX_WHITELIST_LEN: usize = 100_000;
const MAX_TOP_K: usize = 1_000;

struct AppState {
    recommender: Arc<Recommender<i64, i64>>,
    default_top_k: usize,
}

impl AppState {
    fn load(config: ServerConfig) -> Result<Self> {
        let artifacts: Artifacts<i64, i64> =
            Artifacts::load(&config.paths).context("failed to load artifacts")?;
        let default_top_k = config.recommender.top_k;
        let recommender = Recommender::from_artifacts(artifacts, config.recommender)
            .context("failed to build recommender")?;
        Ok(Self {
            recommender: Arc::new(recommender),
            default_top_k,
        })
    }
}

fn main() -> Result<()> {
    setup_tracing();

    let config = ServerConfig::from_env()?;
    let state = AppState::load(config)?;
    info!(
        users = state.recommender.users().len(),
        items = state.recommender.items().len(),
        "annrec-server ready"
    );

    let stdin = io::stdin();
    serve(&state, stdin.lock(), io::stdout().lock())?;
    info!("stdin closed, shutting down");
    Ok(())
}

/// Answer frames until the input ends. A frame that cannot be read gets a
/// JSON-RPC parse error (-32700) and the loop moves on to the next one.
fn serve<R: BufRead, W: Write>(state: &AppState, input: R, mut output: W) -> Result<()> {
    let mut frames = FrameReader::new(input);
    loop {
        let request = match frames.next_frame() {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                let reply = json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": format!("Parse error: {e}") }
                });
                write_frame(&mut output, &reply)?;
                continue;
            }
        };
        if let Some(response) = handle_request(state, &request) {
            write_frame(&mut output, &response)?;
        }
    }
}

/// Logs go to stderr; stdout carries protocol frames only.
fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("annrec=info,annrec_server=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn handle_request(state: &AppState, req: &JsonValue) -> Option<JsonValue> {
    let id = req.get("id").cloned();
    let method = req.get("method").and_then(JsonValue::as_str)?;

    match method {
        "initialize" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "annrec-server", "version": env!("CARGO_PKG_VERSION") }
                }
            })
        }),
        "notifications/initialized" => None,
        "tools/list" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": { "tools": tools_schema() }
            })
        }),
        "tools/call" => id.map(|id_val| match call_tool(state, req.get("params")) {
            Ok(tool_result) => json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": tool_result
            }),
            Err(err) => json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "content": [{ "type": "text", "text": format!("tool error: {err}") }],
                    "isError": true
                }
            }),
        }),
        "ping" => id.map(|id_val| json!({ "jsonrpc": "2.0", "id": id_val, "result": {} })),
        _ => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "error": {
                    "code": -32601,
                    "message": format!("method not found: {method}")
                }
            })
        }),
    }
}

fn recommend_input_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "user_id": {"type": "integer"},
            "item_whitelist": {
                "type": "array",
                "items": {"type": "integer"},
                "maxItems": MAX_WHITELIST_LEN
            },
            "top_k": {"type": "integer", "minimum": 0, "maximum": MAX_TOP_K}
        },
        "required": ["user_id"]
    })
}

fn tools_schema() -> Vec<JsonValue> {
    vec![
        json!({
            "name": "recommend_for_user",
            "description": "Top-K items for a user via the approximate index. An empty or missing whitelist means all items.",
            "inputSchema": recommend_input_schema()
        }),
        json!({
            "name": "recommend_bruteforce",
            "description": "Top-K items for a user by scoring every item exactly.",
            "inputSchema": recommend_input_schema()
        }),
    ]
}

struct RecommendArgs {
    user_id: i64,
    whitelist: Vec<i64>,
    top_k: usize,
}

fn parse_recommend_args(args: &JsonValue, default_top_k: usize) -> Result<RecommendArgs> {
    let user_id = args
        .get("user_id")
        .and_then(JsonValue::as_i64)
        .context("user_id is required and must be an integer")?;

    let whitelist = match args.get("item_whitelist") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(v) => {
            let arr = v.as_array().context("item_whitelist must be an array")?;
            if arr.len() > MAX_WHITELIST_LEN {
                anyhow::bail!("item_whitelist exceeds max allowed length ({MAX_WHITELIST_LEN})");
            }
            arr.iter()
                .map(|id| id.as_i64().context("item_whitelist entries must be integers"))
                .collect::<Result<Vec<_>>>()?
        }
    };

    let top_k = match args.get("top_k") {
        None | Some(JsonValue::Null) => default_top_k,
        Some(v) => {
            let raw = v
                .as_u64()
                .context("top_k must be a non-negative integer")?;
            usize::try_from(raw).context("top_k does not fit in usize")?
        }
    };
    if top_k > MAX_TOP_K {
        anyhow::bail!("top_k exceeds max allowed value ({MAX_TOP_K})");
    }

    Ok(RecommendArgs {
        user_id,
        whitelist,
        top_k,
    })
}

fn call_tool(state: &AppState, params: Option<&JsonValue>) -> Result<JsonValue> {
    let name = params
        .and_then(|v| v.get("name"))
        .and_then(JsonValue::as_str)
        .context("missing tool name")?;
    let args = params
        .and_then(|v| v.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    let rec = &state.recommender;
    let outcome = match name {
        "recommend_for_user" => {
            let a = parse_recommend_args(&args, state.default_top_k)?;
            rec.recommend_approximate(&a.user_id, &a.whitelist, a.top_k)
                .map(|ids| (a.user_id, ids))
        }
        "recommend_bruteforce" => {
            let a = parse_recommend_args(&args, state.default_top_k)?;
            rec.recommend_exact(&a.user_id, &a.whitelist, a.top_k)
                .map(|ids| (a.user_id, ids))
        }
        _ => anyhow::bail!("unknown tool: {name}"),
    };

    match outcome {
        Ok((user_id, item_ids)) => Ok(json!({
            "content": [{ "type": "text", "text": format!("{} item(s) for user {user_id}", item_ids.len()) }],
            "structuredContent": { "user_id": user_id, "item_ids": item_ids }
        })),
        Err(e @ (RecError::UserNotFound(_) | RecError::ItemNotFound(_))) => {
            anyhow::bail!("item or user not found ({e})")
        }
        Err(e) => Err(e.into()),
    }
}
