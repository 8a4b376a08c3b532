// WebSocket connector backed by tokio-tungstenite

use std::borrow::Cow;

use async_trait::async_trait;
use docflow_feed_core::CloseInfo;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::transport::{Connector, Frame, FrameSink, FrameStream};

/// Dials `ws://` and `wss://` feed endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (socket, response) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_message(frame))));

        let stream = stream.filter_map(|message| future::ready(from_message(message)));

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Close(info) => Message::Close(info.map(|info| CloseFrame {
            code: CloseCode::from(info.code),
            reason: Cow::Owned(info.reason),
        })),
    }
}

/// Control frames (ping/pong) are answered by tungstenite and never surface
fn from_message(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<Frame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Ok(Frame::Text(text))),
            Err(_) => {
                tracing::debug!("Dropping non UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => Some(Ok(Frame::Close(frame.map(|frame| {
            CloseInfo::new(u16::from(frame.code), frame.reason.into_owned())
        })))),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}
