//! A single connected session: client handshake, reader task, outbound
//! writes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vibelink_protocol::constants::{HANDSHAKE_TIMEOUT, MAX_FRAME_PAYLOAD, MAX_HANDSHAKE_SIZE};
use vibelink_protocol::frame::{self, Opcode};
use vibelink_protocol::handshake;

use crate::ClientError;
use crate::config::ClientConfig;

/// Random 16-byte `Sec-WebSocket-Key`, base64-encoded.
pub(crate) fn random_key() -> String {
    let mut key = [0u8; 16];
    rand::thread_rng().fill(&mut key);
    STANDARD.encode(key)
}

fn random_mask() -> [u8; 4] {
    rand::random()
}

/// Opens a TCP connection and completes the upgrade handshake.
pub(crate) async fn connect(
    config: &ClientConfig,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), ClientError> {
    let authority = config.authority();
    let stream = TcpStream::connect(&authority).await?;
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let key = random_key();
    write_half
        .write_all(handshake::client_request(&authority, &config.path, &key).as_bytes())
        .await?;

    upgrade_response(&mut reader, &key).await?;
    Ok((reader, write_half))
}

async fn upgrade_response<R>(reader: &mut BufReader<R>, key: &str) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    let head = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        handshake::read_head(reader, MAX_HANDSHAKE_SIZE),
    )
    .await
    .map_err(|_| ClientError::Timeout)??;
    handshake::verify_response(&head, key)?;
    Ok(())
}

/// Runs a connected session until the server goes away or `cancel` fires.
///
/// A message whose write fails is parked in `retry` so the next session
/// sends it first.
pub(crate) async fn run<R, W>(
    reader: R,
    mut writer: W,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    retry: &mut Option<String>,
    inbox: mpsc::UnboundedSender<String>,
    cancel: &CancellationToken,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let session_cancel = cancel.child_token();
    let mut reader_task = tokio::spawn(read_loop(reader, inbox, session_cancel.clone()));

    if let Some(text) = retry.take()
        && let Err(e) = write_text(&mut writer, &text).await
    {
        *retry = Some(text);
        session_cancel.cancel();
        return Err(e);
    }

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),

            ended = &mut reader_task => {
                break match ended {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::Closed),
                };
            }

            msg = outbound.recv() => {
                let Some(text) = msg else {
                    break Ok(());
                };
                if let Err(e) = write_text(&mut writer, &text).await {
                    *retry = Some(text);
                    break Err(e);
                }
            }
        }
    };

    session_cancel.cancel();
    let _ = writer.shutdown().await;
    result
}

async fn write_text<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<(), ClientError> {
    let bytes = frame::encode_masked_text(text.as_bytes(), random_mask());
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Reader task: pushes every server text message into the inbox.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    inbox: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) -> Result<(), ClientError> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = frame::read_frame(&mut reader, MAX_FRAME_PAYLOAD) => result?,
        };
        match frame.opcode {
            Opcode::Text => {
                if inbox.send(frame.into_text()).is_err() {
                    debug!("inbox dropped, ending session");
                    return Ok(());
                }
            }
            Opcode::Close => return Err(ClientError::Closed),
            Opcode::Other(opcode) => debug!(opcode, "ignoring non-text frame"),
        }
    }
}
