//! TCP protocol for installation ↔ detection-server communication.
//!
//! The installation sends one frame and waits for the matching people list
//! before sending the next: at most one detection request is ever in flight.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::pose::Person;

// --- Message types ---

/// Installation → detection server
#[derive(Serialize, Deserialize, Debug)]
pub enum ClientMessage {
    /// One JPEG-compressed camera frame to run pose estimation on
    Frame {
        timestamp_us: u64,
        width: u16,
        height: u16,
        jpeg_data: Vec<u8>,
    },
}

/// Detection server → installation
#[derive(Serialize, Deserialize, Debug)]
pub enum ServerMessage {
    /// Sent once after connect, when the model is loaded
    Ready,
    /// Detection result for the frame with the same timestamp
    People {
        timestamp_us: u64,
        people: Vec<Person>,
    },
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(4 * 1024 * 1024) // 4MB, a JPEG frame is far below this
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(stream: &mut MessageStream, msg: &T) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(stream: &mut MessageStream) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(bincode::deserialize(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}
