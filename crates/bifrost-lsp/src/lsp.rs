use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use anyhow::{Context, Result, anyhow};
use bifrost_core::text::{Position, Range};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};
use url::Url;

pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LspLocation {
    pub uri: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspLocationLink {
    pub target_uri: String,
    #[serde(default)]
    pub target_range: Option<Range>,
    #[serde(default)]
    pub target_selection_range: Option<Range>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspDiagnostic {
    pub range: Range,
    #[serde(default)]
    pub severity: Option<u32>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct PublishDiagnosticsParams {
    uri: String,
    diagnostics: Vec<LspDiagnostic>,
}

/// The language server did not answer within the request timeout.
#[derive(Debug, thiserror::Error)]
#[error("LSP request timed out after {}ms: {method}", .after.as_millis())]
pub struct RequestTimedOut {
    pub method: String,
    pub after: Duration,
}

/// The language server answered with a JSON-RPC error object.
#[derive(Debug, thiserror::Error)]
#[error("LSP error for {method} ({code}): {message}")]
pub struct ServerError {
    pub method: String,
    pub code: i64,
    pub message: String,
}

#[derive(Debug)]
pub struct LspClientOptions {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub initialize_timeout: Duration,
    pub request_timeout: Duration,
    pub initialization_options: Option<Value>,
}

type PendingMap = Arc<StdMutex<HashMap<i64, oneshot::Sender<Value>>>>;
type Diagnostics = Arc<Mutex<HashMap<String, Vec<LspDiagnostic>>>>;

pub struct LspClient {
    stdin: Arc<Mutex<ChildStdin>>,
    next_id: StdMutex<i64>,
    pending: PendingMap,
    child: Mutex<Child>,
    diagnostics: Diagnostics,
    root_uri: String,
    default_request_timeout: Duration,
}

impl LspClient {
    pub async fn start(options: LspClientOptions) -> Result<Self> {
        let mut command = Command::new(&options.command);
        command
            .args(&options.args)
            .current_dir(&options.cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn LSP server: {}", options.command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to capture LSP stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture LSP stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("failed to capture LSP stderr"))?;

        let client = Self {
            stdin: Arc::new(Mutex::new(stdin)),
            next_id: StdMutex::new(1),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            child: Mutex::new(child),
            diagnostics: Arc::new(Mutex::new(HashMap::new())),
            root_uri: Url::from_directory_path(&options.cwd)
                .map_err(|_| anyhow!("failed to build rootUri for {:?}", options.cwd))?
                .to_string(),
            default_request_timeout: options.request_timeout,
        };

        client.spawn_stdout_reader(stdout);
        spawn_stderr_logger(stderr);

        client
            .initialize(options.initialize_timeout, options.initialization_options)
            .await
            .context("failed to initialize LSP server")?;

        Ok(client)
    }

    pub async fn did_open(&self, uri: &str, language_id: &str, version: i32, text: String) -> Result<()> {
        let params = json!({
            "textDocument": {
                "uri": uri,
                "languageId": language_id,
                "version": version,
                "text": text
            }
        });
        self.send_notification("textDocument/didOpen", &params).await
    }

    pub async fn did_change(&self, uri: &str, version: i32, text: String) -> Result<()> {
        let params = json!({
            "textDocument": { "uri": uri, "version": version },
            "contentChanges": [ { "text": text } ]
        });
        self.send_notification("textDocument/didChange", &params)
            .await
    }

    pub async fn text_document_request(
        &self,
        method: &str,
        uri: &str,
        position: Position,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        let params = json!({
            "textDocument": { "uri": uri },
            "position": position
        });
        self.send_request(method, &params, request_timeout).await
    }

    pub async fn references(
        &self,
        uri: &str,
        position: Position,
        include_declaration: bool,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        let params = json!({
            "textDocument": { "uri": uri },
            "position": position,
            "context": { "includeDeclaration": include_declaration }
        });
        self.send_request("textDocument/references", &params, request_timeout)
            .await
    }

    pub async fn document_symbols(&self, uri: &str, request_timeout: Option<Duration>) -> Result<Value> {
        let params = json!({ "textDocument": { "uri": uri } });
        self.send_request("textDocument/documentSymbol", &params, request_timeout)
            .await
    }

    pub async fn code_actions(
        &self,
        uri: &str,
        range: Range,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        let diagnostics: Vec<LspDiagnostic> = self
            .cached_diagnostics(uri)
            .await
            .into_iter()
            .filter(|d| overlaps(&d.range, &range))
            .collect();
        let params = json!({
            "textDocument": { "uri": uri },
            "range": range,
            "context": { "diagnostics": diagnostics }
        });
        self.send_request("textDocument/codeAction", &params, request_timeout)
            .await
    }

    pub async fn rename(
        &self,
        uri: &str,
        position: Position,
        new_name: &str,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        let params = json!({
            "textDocument": { "uri": uri },
            "position": position,
            "newName": new_name
        });
        self.send_request("textDocument/rename", &params, request_timeout)
            .await
    }

    pub async fn workspace_symbols(&self, query: &str, request_timeout: Option<Duration>) -> Result<Value> {
        let params = json!({ "query": query });
        self.send_request("workspace/symbol", &params, request_timeout)
            .await
    }

    pub async fn call_hierarchy_calls(
        &self,
        method: &str,
        item: &Value,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        let params = json!({ "item": item });
        self.send_request(method, &params, request_timeout).await
    }

    pub async fn cached_diagnostics(&self, uri: &str) -> Vec<LspDiagnostic> {
        let guard = self.diagnostics.lock().await;
        guard.get(uri).cloned().unwrap_or_default()
    }

    pub async fn send_request<T: Serialize>(
        &self,
        method: &str,
        params: &T,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        let id = {
            let mut next = lock(&self.next_id);
            let id = *next;
            *next += 1;
            id
        };

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let mut guard = PendingRequest {
            id,
            pending: self.pending.clone(),
            stdin: self.stdin.clone(),
            done: false,
        };

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.write_message(&request).await?;

        let wait = request_timeout.unwrap_or(self.default_request_timeout);
        let response_value = match timeout(wait, rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => {
                guard.done = true;
                return Err(anyhow!("LSP response channel closed: {method}"));
            }
            Err(_) => {
                return Err(RequestTimedOut {
                    method: method.to_string(),
                    after: wait,
                }
                .into());
            }
        };
        guard.done = true;

        if let Some(error) = response_value.get("error") {
            return Err(ServerError {
                method: method.to_string(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }
            .into());
        }

        Ok(response_value.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn send_notification<T: Serialize>(&self, method: &str, params: &T) -> Result<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_message(&notification).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        // Best-effort graceful shutdown, then kill as fallback.
        let _ = self
            .send_request("shutdown", &Value::Null, Some(Duration::from_secs(2)))
            .await;
        let _ = self.send_notification("exit", &Value::Null).await;

        let mut child = self.child.lock().await;
        let _ = child.kill().await;
        let _ = child.wait().await;
        Ok(())
    }

    async fn initialize(&self, initialize_timeout: Duration, options: Option<Value>) -> Result<()> {
        let mut params = json!({
            "processId": std::process::id(),
            "rootUri": self.root_uri,
            "capabilities": {
                "textDocument": {
                    "synchronization": { "didSave": false },
                    "definition": { "linkSupport": true },
                    "typeDefinition": { "linkSupport": true },
                    "implementation": { "linkSupport": true },
                    "references": {},
                    "hover": { "contentFormat": ["markdown", "plaintext"] },
                    "documentSymbol": { "hierarchicalDocumentSymbolSupport": true },
                    "codeAction": {
                        "codeActionLiteralSupport": {
                            "codeActionKind": {
                                "valueSet": ["", "quickfix", "refactor", "refactor.extract", "refactor.inline", "refactor.rewrite", "source", "source.organizeImports"]
                            }
                        },
                        "isPreferredSupport": true
                    },
                    "rename": { "prepareSupport": false },
                    "callHierarchy": {},
                    "publishDiagnostics": {}
                },
                "workspace": {
                    "symbol": {},
                    "workspaceFolders": true,
                    "configuration": true
                }
            },
            "workspaceFolders": [
                { "uri": self.root_uri, "name": "workspace" }
            ]
        });
        if let Some(options) = options
            && let Some(obj) = params.as_object_mut()
        {
            obj.insert("initializationOptions".to_string(), options);
        }

        let _ = self
            .send_request("initialize", &params, Some(initialize_timeout))
            .await?;
        self.send_notification("initialized", &json!({})).await?;
        Ok(())
    }

    async fn write_message(&self, value: &Value) -> Result<()> {
        write_frame(&self.stdin, value).await
    }

    fn spawn_stdout_reader<R: AsyncRead + Unpin + Send + 'static>(&self, stdout: R) {
        let pending = self.pending.clone();
        let diagnostics = self.diagnostics.clone();
        let stdin = self.stdin.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_lsp_message(&mut reader).await {
                    Ok(Some(message)) => {
                        handle_lsp_message(message, &pending, &diagnostics, &stdin).await;
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("failed to read LSP message: {err:#}");
                        break;
                    }
                }
            }
            // Fail every in-flight request once the server goes away.
            lock(&pending).clear();
        });
    }
}

/// Removes the pending entry and tells the server to stop work when a request is abandoned.
struct PendingRequest {
    id: i64,
    pending: PendingMap,
    stdin: Arc<Mutex<ChildStdin>>,
    done: bool,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        lock(&self.pending).remove(&self.id);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let stdin = self.stdin.clone();
        let cancel = json!({
            "jsonrpc": "2.0",
            "method": "$/cancelRequest",
            "params": { "id": self.id }
        });
        handle.spawn(async move {
            if let Err(err) = write_frame(&stdin, &cancel).await {
                debug!("failed to send $/cancelRequest: {err:#}");
            }
        });
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn overlaps(a: &Range, b: &Range) -> bool {
    let before = |x: &Position, y: &Position| (x.line, x.character) < (y.line, y.character);
    !(before(&a.end, &b.start) || before(&b.end, &a.start))
}

async fn write_frame(stdin: &Mutex<ChildStdin>, value: &Value) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut stdin = stdin.lock().await;
    stdin.write_all(header.as_bytes()).await?;
    stdin.write_all(&body).await?;
    stdin.flush().await?;
    Ok(())
}

async fn handle_lsp_message(
    message: Value,
    pending: &PendingMap,
    diagnostics: &Diagnostics,
    stdin: &Mutex<ChildStdin>,
) {
    if let Some(method) = message.get("method").and_then(Value::as_str) {
        // Requests from the server carry an id and expect an answer.
        if let Some(id) = message.get("id") {
            let result = server_request_result(method, message.get("params"));
            let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
            if let Err(err) = write_frame(stdin, &response).await {
                warn!("failed to answer server request {method}: {err:#}");
            }
            return;
        }

        if method == "textDocument/publishDiagnostics"
            && let Some(params) = message.get("params")
        {
            match serde_json::from_value::<PublishDiagnosticsParams>(params.clone()) {
                Ok(p) => {
                    diagnostics.lock().await.insert(p.uri, p.diagnostics);
                }
                Err(err) => warn!("failed to parse publishDiagnostics params: {err:#}"),
            }
        }
        return;
    }

    let id = match message.get("id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    };

    if let Some(id) = id {
        let tx = lock(pending).remove(&id);
        if let Some(tx) = tx {
            let _ = tx.send(message);
        } else {
            debug!("received response for unknown id: {id}");
        }
    }
}

fn server_request_result(method: &str, params: Option<&Value>) -> Value {
    match method {
        "workspace/configuration" => {
            let count = params
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Value::Array(vec![Value::Null; count])
        }
        "workspace/applyEdit" => json!({ "applied": false }),
        _ => Value::Null,
    }
}

async fn read_lsp_message<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Option<Value>> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let line_trimmed = line.trim_end_matches(['\r', '\n']);
        if line_trimmed.is_empty() {
            break;
        }

        if let Some(value) = line_trimmed.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
    }

    let Some(len) = content_length else {
        return Err(anyhow!("missing Content-Length header"));
    };

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    let value: Value = serde_json::from_slice(&buf)?;
    Ok(Some(value))
}

fn spawn_stderr_logger(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => debug!(target: "lsp.stderr", "{}", line.trim_end()),
                Err(_) => break,
            }
        }
    });
}

pub fn path_to_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map_err(|_| anyhow!("failed to convert path to file URI: {path:?}"))
        .map(|u| u.to_string())
}

pub fn uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri).with_context(|| format!("invalid URI: {uri}"))?;
    if url.scheme() != "file" {
        return Err(anyhow!("unsupported URI scheme: {}", url.scheme()));
    }
    url.to_file_path()
        .map_err(|_| anyhow!("failed to convert URI to path: {uri}"))
}
