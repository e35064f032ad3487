use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::Message;

/// A command from a connected client, tagged by `type`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    Start,
    Pause,
    Reset,
    Preset { id: String },
    Purpose { value: String },
    Note { value: String },
    AddImages { images: Vec<String> },
    ClearImages,
    Status,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// Snapshot pushed to every client whenever the timer state changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub phase: String,
    pub remaining_seconds: u32,
    pub display: String,
    pub is_running: bool,
    pub image_count: usize,
    pub background: Option<String>,
}

/// A command plus the slot its reply goes back through.
#[derive(Debug)]
pub struct CommandEnvelope {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<ControlResponse>,
}

pub type CommandSender = mpsc::UnboundedSender<CommandEnvelope>;
pub type CommandReceiver = mpsc::UnboundedReceiver<CommandEnvelope>;

pub fn create_command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

pub async fn start_control_server(
    listener: TcpListener,
    command_tx: CommandSender,
    state_rx: watch::Receiver<StateSnapshot>,
) -> Result<(), Box<dyn std::error::Error>> {
    while let Ok((stream, peer_addr)) = listener.accept().await {
        log::info!("New control connection from: {peer_addr}");
        tokio::spawn(handle_connection(
            stream,
            peer_addr,
            command_tx.clone(),
            state_rx.clone(),
        ));
    }
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    command_tx: CommandSender,
    mut state_rx: watch::Receiver<StateSnapshot>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("WebSocket handshake failed with {peer_addr}: {e}");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Fresh clients get the current state up front so they can render
    // without waiting for the next change.
    let snapshot = state_rx.borrow_and_update().clone();
    if let Ok(json) = serde_json::to_string(&snapshot) {
        if ws_sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state_rx.borrow_and_update().clone();
                let Ok(json) = serde_json::to_string(&snapshot) else {
                    continue;
                };
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            msg = ws_receiver.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => {
                        let response = match serde_json::from_str::<ControlCommand>(&text) {
                            Ok(command) => dispatch(&command_tx, command).await,
                            Err(e) => {
                                log::warn!("Failed to parse command: {e}");
                                ControlResponse {
                                    success: false,
                                    message: Some(format!("Parse error: {e}")),
                                }
                            }
                        };
                        if let Ok(json) = serde_json::to_string(&response) {
                            if ws_sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("Control connection closed by {peer_addr}");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if ws_sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("WebSocket error from {peer_addr}: {e}");
                        break;
                    }
                }
            }
        }
    }

    log::info!("Control connection with {peer_addr} terminated");
}

async fn dispatch(command_tx: &CommandSender, command: ControlCommand) -> ControlResponse {
    let (reply_tx, reply_rx) = oneshot::channel();
    let envelope = CommandEnvelope {
        command,
        reply: reply_tx,
    };
    if command_tx.send(envelope).is_err() {
        return ControlResponse {
            success: false,
            message: Some("Timer loop is gone".to_string()),
        };
    }
    match reply_rx.await {
        Ok(response) => response,
        Err(_) => ControlResponse {
            success: false,
            message: Some("No reply from timer loop".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        let command: ControlCommand = serde_json::from_str(r#"{"type":"start"}"#).unwrap();
        assert_eq!(command, ControlCommand::Start);

        let command: ControlCommand =
            serde_json::from_str(r#"{"type":"preset","id":"25-5"}"#).unwrap();
        assert_eq!(command, ControlCommand::Preset { id: "25-5".into() });

        let command: ControlCommand =
            serde_json::from_str(r#"{"type":"add_images","images":["data:image/png;base64,"]}"#)
                .unwrap();
        assert_eq!(
            command,
            ControlCommand::AddImages {
                images: vec!["data:image/png;base64,".into()]
            }
        );

        assert!(serde_json::from_str::<ControlCommand>(r#"{"type":"explode"}"#).is_err());
        assert!(serde_json::from_str::<ControlCommand>("not json").is_err());
    }

    #[test]
    fn test_response_serialization() {
        let response = ControlResponse {
            success: true,
            message: Some("Timer started".to_string()),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"message\":\"Timer started\""));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = StateSnapshot {
            phase: "WORK".into(),
            remaining_seconds: 1500,
            display: "25:00".into(),
            is_running: true,
            image_count: 2,
            background: None,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"phase\":\"WORK\""));
        assert!(json.contains("\"display\":\"25:00\""));
        assert!(json.contains("\"remaining_seconds\":1500"));
    }
}
