use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::body::Bytes;
use futures_core::Stream;

use crate::buffer::{EncodedFrame, FrameBuffer};

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub fn encode_part(frame: &EncodedFrame) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );
    let mut part = Vec::with_capacity(header.len() + frame.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(frame.data());
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Endless per-viewer stream; only frames newer than the last one sent are emitted.
pub fn frame_stream(
    buffer: Arc<FrameBuffer>,
    poll_interval: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream! {
        let mut last_sent = 0u64;
        loop {
            match buffer.read() {
                Some(frame) if frame.version() > last_sent => {
                    last_sent = frame.version();
                    yield Ok(encode_part(&frame));
                }
                _ => tokio::time::sleep(poll_interval).await,
            }
        }
    }
}
