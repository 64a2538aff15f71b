use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;

fn frame(message: &Value) -> Vec<u8> {
	let body = serde_json::to_vec(message).unwrap();
	let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
	frame.extend_from_slice(&body);
	frame
}

#[tokio::test]
async fn test_send_message() {
	// Transport writes into `out_write`, we read from `out_read`.
	let (mut out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, _in_write) = tokio::io::duplex(1024);

	let (transport, _rx) = FramedTransport::new(out_write, in_read);
	let (mut sender, _receiver) = transport.into_parts();

	let message = serde_json::json!({"seq": 1, "type": "request", "command": "threads"});
	sender.send(message.clone()).await.unwrap();

	let expected = frame(&message);
	let mut written = vec![0u8; expected.len()];
	out_read.read_exact(&mut written).await.unwrap();
	assert_eq!(written, expected);
}

#[tokio::test]
async fn test_multiple_messages_in_sequence() {
	let (_out_read, out_write) = tokio::io::duplex(4096);
	let (in_read, mut in_write) = tokio::io::duplex(4096);

	let (mut transport, mut rx) = FramedTransport::new(out_write, in_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let messages = vec![
		serde_json::json!({"seq": 1, "type": "event", "event": "initialized"}),
		serde_json::json!({"seq": 2, "type": "event", "event": "stopped"}),
		serde_json::json!({"seq": 3, "type": "event", "event": "terminated"}),
	];

	for msg in &messages {
		in_write.write_all(&frame(msg)).await.unwrap();
	}
	in_write.flush().await.unwrap();

	for expected in &messages {
		let received = rx.recv().await.unwrap();
		assert_eq!(&received, expected);
	}

	drop(in_write);
	assert!(read_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_extra_headers_are_ignored() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, mut in_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = FramedTransport::new(out_write, in_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let body = br#"{"seq":7}"#;
	let raw = format!("Content-Type: application/json\r\ncontent-length: {}\r\n\r\n", body.len());
	in_write.write_all(raw.as_bytes()).await.unwrap();
	in_write.write_all(body).await.unwrap();
	in_write.flush().await.unwrap();

	assert_eq!(rx.recv().await.unwrap(), serde_json::json!({"seq": 7}));

	drop(in_write);
	let _ = read_task.await;
}

#[tokio::test]
async fn test_large_message() {
	let (_out_read, out_write) = tokio::io::duplex(1024 * 1024);
	let (in_read, mut in_write) = tokio::io::duplex(1024 * 1024);

	let (mut transport, mut rx) = FramedTransport::new(out_write, in_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let large_message = serde_json::json!({
		"seq": 1,
		"body": "x".repeat(100_000),
	});
	in_write.write_all(&frame(&large_message)).await.unwrap();
	in_write.flush().await.unwrap();

	let received = rx.recv().await.unwrap();
	assert_eq!(received, large_message);

	drop(in_write);
	let _ = read_task.await;
}

#[tokio::test]
async fn test_missing_content_length() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, mut in_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = FramedTransport::new(out_write, in_read);

	in_write.write_all(b"Content-Type: application/json\r\n\r\n{}").await.unwrap();
	drop(in_write);

	let err = transport.run().await.unwrap_err();
	assert!(err.to_string().contains("missing Content-Length"), "unexpected error: {err}");
}

#[tokio::test]
async fn test_oversized_frame_rejected() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, mut in_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = FramedTransport::new(out_write, in_read);

	let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_LEN + 1);
	in_write.write_all(header.as_bytes()).await.unwrap();
	drop(in_write);

	match transport.run().await {
		Err(Error::FrameTooLarge { len, max }) => {
			assert_eq!(len, MAX_FRAME_LEN + 1);
			assert_eq!(max, MAX_FRAME_LEN);
		}
		other => panic!("expected FrameTooLarge, got {other:?}"),
	}
}

#[tokio::test]
async fn test_unterminated_header_line_rejected() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, mut in_write) = tokio::io::duplex(4 * MAX_HEADER_LEN);

	let (mut transport, _rx) = FramedTransport::new(out_write, in_read);

	// The writer stays open, so only the line limit ends the read.
	in_write.write_all(&vec![b'a'; 2 * MAX_HEADER_LEN]).await.unwrap();

	let err = tokio::time::timeout(std::time::Duration::from_secs(5), transport.run())
		.await
		.expect("reader must not wait for a newline forever")
		.unwrap_err();
	assert!(err.to_string().contains("Header line exceeds"), "unexpected error: {err}");
	drop(in_write);
}

#[tokio::test]
async fn test_truncated_body() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, mut in_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = FramedTransport::new(out_write, in_read);

	in_write.write_all(b"Content-Length: 50\r\n\r\n{\"seq\":").await.unwrap();
	drop(in_write);

	let err = transport.run().await.unwrap_err();
	assert!(err.to_string().contains("Failed to read frame body"), "unexpected error: {err}");
}

#[tokio::test]
async fn test_eof_inside_header() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, mut in_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = FramedTransport::new(out_write, in_read);

	in_write.write_all(b"Content-Length: 12\r\n").await.unwrap();
	drop(in_write);

	assert!(transport.run().await.is_err());
}

#[tokio::test]
async fn test_clean_eof_is_graceful() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, in_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = FramedTransport::new(out_write, in_read);
	drop(in_write);

	assert!(transport.run().await.is_ok());
}

#[tokio::test]
async fn test_dropped_sink_stops_reader() {
	let (_out_read, out_write) = tokio::io::duplex(1024);
	let (in_read, mut in_write) = tokio::io::duplex(1024);

	let (mut transport, rx) = FramedTransport::new(out_write, in_read);
	drop(rx);

	in_write.write_all(&frame(&serde_json::json!({"seq": 1}))).await.unwrap();
	in_write.flush().await.unwrap();

	// Reader returns as soon as it has nowhere to deliver the first message.
	assert!(transport.run().await.is_ok());
}
