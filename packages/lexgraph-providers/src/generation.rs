use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

pub type DeltaStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: String,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: "system".to_string(), content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: "user".to_string(), content: content.into() }
	}
}

#[derive(Debug, PartialEq)]
enum SseLine {
	Delta(String),
	Done,
	Skip,
}

fn request_body(
	cfg: &lexgraph_config::GenerationProviderConfig,
	messages: &[ChatMessage],
	stream: bool,
) -> Value {
	serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": messages,
		"stream": stream,
	})
}

/// Runs a chat completion and returns the full answer text.
pub async fn generate(
	cfg: &lexgraph_config::GenerationProviderConfig,
	messages: &[ChatMessage],
) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&request_body(cfg, messages, false))
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_response(&json)
}

/// Runs a streaming chat completion and yields content deltas as they arrive.
///
/// The request itself is sent before returning, so connection and status failures surface here
/// rather than as the first stream item.
pub async fn generate_stream(
	cfg: &lexgraph_config::GenerationProviderConfig,
	messages: &[ChatMessage],
) -> Result<DeltaStream> {
	let client = crate::stream_client(cfg.timeout_ms)?;

	tracing::debug!(model = %cfg.model, messages = messages.len(), "Sending streaming chat completion request.");

	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&request_body(cfg, messages, true))
		.send()
		.await?
		.error_for_status()?;
	let stream = async_stream::stream! {
		let mut bytes_stream = res.bytes_stream();
		let mut lines = LineBuffer::default();

		'outer: while let Some(chunk) = bytes_stream.next().await {
			let bytes = match chunk {
				Ok(bytes) => bytes,
				Err(err) => {
					yield Err(Error::from(err));

					break;
				},
			};

			for line in lines.push(&bytes) {
				match line.and_then(|line| parse_sse_line(&line)) {
					Ok(SseLine::Delta(delta)) => yield Ok(delta),
					Ok(SseLine::Done) => break 'outer,
					Ok(SseLine::Skip) => {},
					Err(err) => {
						yield Err(err);

						break 'outer;
					},
				}
			}
		}

		if let Some(Ok(SseLine::Delta(delta))) =
			lines.finish().map(|line| line.and_then(|line| parse_sse_line(&line)))
		{
			yield Ok(delta);
		}
	};

	Ok(stream.boxed())
}

/// Splits a byte stream into lines. Bytes are held until their line is complete, so a character
/// split across network chunks is decoded whole.
#[derive(Debug, Default)]
struct LineBuffer {
	pending: Vec<u8>,
}
impl LineBuffer {
	fn push(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
		self.pending.extend_from_slice(bytes);

		let mut lines = Vec::new();

		while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
			let line: Vec<u8> = self.pending.drain(..=pos).collect();

			lines.push(decode_line(&line[..pos]));
		}

		lines
	}

	/// Returns the trailing partial line, if any.
	fn finish(&mut self) -> Option<Result<String>> {
		if self.pending.iter().all(u8::is_ascii_whitespace) {
			return None;
		}

		let rest = std::mem::take(&mut self.pending);

		Some(decode_line(&rest))
	}
}

fn decode_line(bytes: &[u8]) -> Result<String> {
	std::str::from_utf8(bytes).map(str::to_string).map_err(|err| Error::InvalidResponse {
		message: format!("Generation stream line is not valid UTF-8: {err}"),
	})
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
	let line = line.trim();
	let Some(data) = line.strip_prefix("data:") else {
		return Ok(SseLine::Skip);
	};
	let data = data.trim();

	if data == "[DONE]" {
		return Ok(SseLine::Done);
	}
	if data.is_empty() {
		return Ok(SseLine::Skip);
	}

	let json: Value = serde_json::from_str(data)?;

	if let Some(message) = json.get("error").and_then(|err| err.get("message")).and_then(Value::as_str)
	{
		return Err(Error::InvalidResponse { message: format!("Generation stream error: {message}") });
	}

	match json
		.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("delta"))
		.and_then(|delta| delta.get("content"))
		.and_then(Value::as_str)
	{
		Some(content) if !content.is_empty() => Ok(SseLine::Delta(content.to_string())),
		_ => Ok(SseLine::Skip),
	}
}

fn parse_completion_response(json: &Value) -> Result<String> {
	json.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Generation response is missing message content.".to_string(),
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_delta_lines() {
		let line = r#"data: {"choices":[{"delta":{"content":"Thuế"}}]}"#;

		assert_eq!(parse_sse_line(line).expect("parse failed"), SseLine::Delta("Thuế".to_string()));
	}

	#[test]
	fn recognizes_done_and_comments() {
		assert_eq!(parse_sse_line("data: [DONE]").expect("parse failed"), SseLine::Done);
		assert_eq!(parse_sse_line(": keep-alive").expect("parse failed"), SseLine::Skip);
		assert_eq!(
			parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#)
				.expect("parse failed"),
			SseLine::Skip
		);
	}

	#[test]
	fn surfaces_stream_errors() {
		let line = r#"data: {"error":{"message":"overloaded"}}"#;

		assert!(matches!(parse_sse_line(line), Err(Error::InvalidResponse { .. })));
	}

	#[test]
	fn line_buffer_keeps_characters_split_across_chunks() {
		let line = "data: {\"choices\":[{\"delta\":{\"content\":\"thuế\"}}]}\n".as_bytes();
		let split = line.len() - 8;
		let mut buffer = LineBuffer::default();

		assert!(buffer.push(&line[..split]).is_empty());

		let lines = buffer.push(&line[split..]);

		assert_eq!(lines.len(), 1);

		let decoded = lines.into_iter().next().expect("line expected").expect("decode failed");

		assert_eq!(parse_sse_line(&decoded).expect("parse failed"), SseLine::Delta("thuế".to_string()));
		assert!(buffer.finish().is_none());
	}

	#[test]
	fn line_buffer_returns_trailing_partial_line() {
		let mut buffer = LineBuffer::default();

		assert!(buffer.push(b"data: [DONE]").is_empty());
		assert_eq!(buffer.finish().expect("line expected").expect("decode failed"), "data: [DONE]");
	}

	#[test]
	fn parses_completion_content() {
		let json = serde_json::json!({
			"choices": [{ "message": { "role": "assistant", "content": "Answer [Source 1]" } }]
		});

		assert_eq!(parse_completion_response(&json).expect("parse failed"), "Answer [Source 1]");
	}
}
