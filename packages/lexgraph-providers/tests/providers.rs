use std::time::Duration;

use futures::StreamExt;
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::TcpListener,
};

use lexgraph_config::GenerationProviderConfig;
use lexgraph_providers::{Error, generation::ChatMessage};

fn generation_config(api_base: String, timeout_ms: u64) -> GenerationProviderConfig {
	GenerationProviderConfig {
		provider_id: "test".to_string(),
		api_base,
		api_key: "test-key".to_string(),
		path: "/v1/chat/completions".to_string(),
		model: "test".to_string(),
		temperature: 0.0,
		max_tokens: 64,
		timeout_ms,
		default_headers: Map::new(),
	}
}

/// Serves one chunked SSE response, pausing `gap` between chunks.
async fn serve_chunks(chunks: Vec<Vec<u8>>, gap: Duration) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind listener.");
	let addr = listener.local_addr().expect("Failed to read listener address.");

	tokio::spawn(async move {
		let (mut socket, _) = listener.accept().await.expect("Failed to accept connection.");
		let mut request = Vec::new();
		let mut buf = [0_u8; 4096];

		loop {
			let read = socket.read(&mut buf).await.expect("Failed to read request.");

			request.extend_from_slice(&buf[..read]);

			let text = String::from_utf8_lossy(&request).to_string();

			if let Some(header_end) = text.find("\r\n\r\n") {
				let content_length = text[..header_end]
					.lines()
					.find_map(|line| {
						let (name, value) = line.split_once(':')?;

						name.eq_ignore_ascii_case("content-length")
							.then(|| value.trim().parse::<usize>().ok())
							.flatten()
					})
					.unwrap_or(0);

				if request.len() >= header_end + 4 + content_length {
					break;
				}
			}
			if read == 0 {
				break;
			}
		}

		socket
			.write_all(
				b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n",
			)
			.await
			.expect("Failed to write headers.");

		for chunk in chunks {
			tokio::time::sleep(gap).await;

			let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();

			frame.extend_from_slice(&chunk);
			frame.extend_from_slice(b"\r\n");
			socket.write_all(&frame).await.expect("Failed to write chunk.");
		}

		socket.write_all(b"0\r\n\r\n").await.expect("Failed to finish response.");
	});

	format!("http://{addr}")
}

#[tokio::test]
async fn stream_decodes_characters_split_across_chunks_and_outlives_the_timeout() {
	let body = concat!(
		"data: {\"choices\":[{\"delta\":{\"content\":\"thuế\"}}]}\n\n",
		"data: {\"choices\":[{\"delta\":{\"content\":\" giá trị gia tăng\"}}]}\n\n",
		"data: [DONE]\n\n"
	)
	.as_bytes();
	let first_split = body.iter().position(|byte| *byte == 0xBA).expect("Missing split byte.");
	let second_split = first_split + 40;
	let chunks = vec![
		body[..first_split].to_vec(),
		body[first_split..second_split].to_vec(),
		body[second_split..].to_vec(),
	];
	let api_base = serve_chunks(chunks, Duration::from_millis(150)).await;
	let cfg = generation_config(api_base, 300);
	let stream = lexgraph_providers::generation::generate_stream(&cfg, &[ChatMessage::user("q")])
		.await
		.expect("Failed to open stream.");
	let deltas: Vec<String> =
		stream.map(|item| item.expect("Stream item failed.")).collect().await;

	assert_eq!(deltas.concat(), "thuế giá trị gia tăng");
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		lexgraph_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn forwards_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("x-tenant".to_string(), Value::String("tax".to_string()));

	let headers =
		lexgraph_providers::auth_headers("secret", &defaults).expect("Failed to build headers.");

	assert_eq!(headers.get("x-tenant").expect("Missing default header."), "tax");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("x-retries".to_string(), Value::from(3));

	let err = lexgraph_providers::auth_headers("secret", &defaults)
		.expect_err("Numeric header values must be rejected.");

	assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[test]
fn chat_messages_serialize_with_roles() {
	let json = serde_json::to_value(vec![ChatMessage::system("rules"), ChatMessage::user("q")])
		.expect("Failed to serialize messages.");

	assert_eq!(json[0]["role"], "system");
	assert_eq!(json[1]["content"], "q");
}
