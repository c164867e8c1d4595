//! analyze_file / smart_read — server-side file reading through a
//! large-context model. The calling agent never sees the raw bytes.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;

use crate::subprotocol::distill::{distill, Distilled};
use crate::subprotocol::select;
use crate::tools::{format_latency, format_tokens, parse_args, ToolContext, ToolSpec};
use crate::{Backend, HydraError, QueryOptions, Result};

/// Files larger than this many characters are rejected.
const MAX_FILE_CHARS: usize = 800_000;
/// A null byte in this prefix marks the file as binary.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalyzeInput {
    file_path: String,
    #[serde(alias = "query")]
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    max_response_tokens: Option<u32>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    include_raw: bool,
}

pub fn analyze_spec() -> ToolSpec {
    ToolSpec {
        name: "analyze_file",
        description: "Read a file server-side and have a large-context model analyze it. \
The file content never enters the caller's context.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "prompt": {"type": "string", "description": "What to analyze"},
                "model": {"type": "string"},
                "max_tokens": {"type": "integer", "minimum": 1},
                "max_response_tokens": {"type": "integer", "minimum": 1},
                "format": {"type": "string", "enum": ["brief", "detailed"]},
                "include_raw": {"type": "boolean", "default": false}
            },
            "required": ["file_path", "prompt"]
        }),
    }
}

pub fn smart_read_spec() -> ToolSpec {
    ToolSpec {
        name: "smart_read",
        description: "Read a file server-side and extract the parts relevant to a query, \
verbatim with line ranges.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "query": {"type": "string", "description": "What to extract"},
                "model": {"type": "string"},
                "max_tokens": {"type": "integer", "minimum": 1},
                "max_response_tokens": {"type": "integer", "minimum": 1},
                "format": {"type": "string", "enum": ["brief", "detailed"]},
                "include_raw": {"type": "boolean", "default": false}
            },
            "required": ["file_path", "query"]
        }),
    }
}

pub async fn run_analyze(ctx: &ToolContext, args: serde_json::Value) -> Result<String> {
    run(ctx, args, Mode::Analyze).await
}

pub async fn run_smart_read(ctx: &ToolContext, args: serde_json::Value) -> Result<String> {
    run(ctx, args, Mode::SmartRead).await
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Analyze,
    SmartRead,
}

async fn run(ctx: &ToolContext, args: serde_json::Value, mode: Mode) -> Result<String> {
    let input: AnalyzeInput = parse_args(args)?;
    let content = read_text_file(Path::new(&input.file_path)).await?;
    let file_chars = content.chars().count();
    let file_lines = content.lines().count();

    let catalog = ctx.smart.list_models().await.unwrap_or_default();
    let model = select::pick_large_context(&catalog, input.model.as_deref()).ok_or_else(|| {
        HydraError::Routing {
            model: "(large-context)".into(),
            detail: "no models available for file analysis".into(),
        }
    })?;

    let instructions = match mode {
        Mode::Analyze => format!(
            "Analyze the file below and answer this request in prose:\n{}\n",
            input.prompt
        ),
        Mode::SmartRead => format!(
            "Extract the parts of the file below relevant to this query. Quote them verbatim \
and annotate each quoted section with its line range (e.g. `lines 10-24`):\n{}\n",
            input.prompt
        ),
    };
    let prompt = format!(
        "{instructions}\n--- File: {} ({file_chars} chars, {file_lines} lines) ---\n```\n{content}\n```\n",
        input.file_path
    );

    let options = QueryOptions::default().max_tokens(input.max_tokens.unwrap_or(2048));
    let response = ctx.smart.query(&model, &prompt, &options).await?;

    let raw_snapshot = input.include_raw.then(|| response.content.clone());
    let distilled = match input.max_response_tokens {
        Some(budget) if budget > 0 => distill(&ctx.smart, &model, response, budget).await,
        Some(_) => {
            return Err(HydraError::Validation(
                "max_response_tokens must be at least 1".into(),
            ))
        }
        None => Distilled::Skipped(response),
    };
    let response = distilled.response();
    let response_tokens = response.observed_completion_tokens();
    let context_saved = (file_chars.div_ceil(4) as i64) - response_tokens as i64;

    let title = match mode {
        Mode::Analyze => "File analysis",
        Mode::SmartRead => "Smart read",
    };
    let brief = input.format.as_deref() == Some("brief");
    let mut out = if brief {
        format!("{}\n", response.content)
    } else {
        format!(
            "# {title}: {}\n\n_Analyzed by {} · {} chars · {} lines_\n\n{}\n",
            input.file_path, response.model, file_chars, file_lines, response.content
        )
    };
    out.push_str(&format!(
        "\n---\n- Latency: {}\n- Tokens: {}\n- Context saved: ~{context_saved} tokens\n",
        format_latency(response.latency_ms),
        format_tokens(response.usage),
    ));
    if let Some(stats) = distilled.stats() {
        out.push_str(&format!(
            "- Distilled: {} → {} tokens by {} ({}% saved)\n",
            stats.source_tokens,
            stats.distilled_tokens,
            stats.distiller_model,
            stats.savings_pct(),
        ));
    }
    if let (Some(raw), Distilled::Compressed(..)) = (raw_snapshot, &distilled) {
        out.push_str(&format!(
            "\n<details>\n<summary>Raw response</summary>\n\n{raw}\n\n</details>\n"
        ));
    }
    Ok(out)
}

/// Validate and read a file: must exist, be non-binary, and fit the size
/// cap.
async fn read_text_file(path: &Path) -> Result<String> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(HydraError::Validation(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let bytes = tokio::fs::read(path).await?;
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if sniff.contains(&0) {
        return Err(HydraError::Validation(format!(
            "{} looks binary; only text files can be analyzed",
            path.display()
        )));
    }
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let chars = content.chars().count();
    if chars > MAX_FILE_CHARS {
        return Err(HydraError::Validation(format!(
            "{} is {chars} characters; the limit is {MAX_FILE_CHARS}",
            path.display()
        )));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_validation_error() {
        let err = read_text_file(Path::new("/nonexistent/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, HydraError::Validation(_)));
    }

    #[tokio::test]
    async fn binary_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0x7fu8, b'E', b'L', b'F', 0x00, 0x01]).unwrap();
        let err = read_text_file(&path).await.unwrap_err();
        assert!(matches!(err, HydraError::Validation(_)));
    }

    #[tokio::test]
    async fn text_file_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "hello world\nsecond line\n").unwrap();
        let content = read_text_file(&path).await.unwrap();
        assert!(content.contains("second line"));
    }
}
