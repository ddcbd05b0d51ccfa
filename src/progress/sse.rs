//! Server-sent-events framing for progress events.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use super::{ProgressEvent, ProgressSink, SinkError};

/// Encode one event as an SSE frame: `data: <json>\n\n`.
pub fn sse_frame(event: &ProgressEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Writes SSE frames to any writer (stdout for the CLI, a socket elsewhere).
pub struct SseSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> SseSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ProgressSink for SseSink<W> {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        let frame = sse_frame(event).map_err(|e| SinkError::Write(e.to_string()))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_all(frame.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe => SinkError::Closed,
                _ => SinkError::Write(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::PipelineStage;

    #[test]
    fn frame_format() {
        let frame = sse_frame(&ProgressEvent::Error { error: "x".into() }).unwrap();
        assert_eq!(frame, "data: {\"type\":\"error\",\"error\":\"x\"}\n\n");
    }

    #[test]
    fn sink_writes_frames_in_order() {
        let sink = SseSink::new(Vec::new());
        for current in 1..=2 {
            sink.deliver(&ProgressEvent::Progress {
                step: PipelineStage::Extraction,
                current,
                total: 2,
                message: String::new(),
            })
            .unwrap();
        }
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let frames: Vec<&str> = out.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"current\":1"));
        assert!(frames[1].contains("\"current\":2"));
    }
}
