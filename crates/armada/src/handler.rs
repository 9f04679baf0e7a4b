//! Per-connection handling: handshake, the writer pump, the read loop,
//! and envelope dispatch.

use std::sync::Arc;
use std::time::Duration;

use armada_protocol::{Codec, Envelope, JsonCodec, PayloadKind};
use armada_room::{LOBBY_ROOM, Registry, Room, RoomClient, RoomError};
use armada_transport::WsConnection;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ArmadaError;

/// How long a fresh connection gets to identify itself.
const HANDSHAKE_SECONDS: u64 = 3;

/// Drives one client connection from accept to teardown.
pub(crate) async fn handle_connection(connection: WsConnection, registry: Arc<Registry>) {
    let connection_id = connection.id();
    if let Err(error) = run_connection(connection, registry).await {
        debug!(%connection_id, %error, "connection ended with error");
    }
}

async fn run_connection(
    connection: WsConnection,
    registry: Arc<Registry>,
) -> Result<(), ArmadaError> {
    let codec = JsonCodec;
    let connection_id = connection.id();
    let (mut sink, mut stream) = connection.split();

    // The first frame must be a handshake naming the client, within the
    // deadline. Anything else and the connection is closed quietly.
    let handshake =
        tokio::time::timeout(Duration::from_secs(HANDSHAKE_SECONDS), stream.recv()).await;
    let name = match handshake {
        Err(_) => {
            info!(%connection_id, "no handshake within the deadline, closing");
            let _ = sink.close().await;
            return Ok(());
        }
        Ok(Err(error)) => return Err(error.into()),
        Ok(Ok(None)) => return Ok(()),
        Ok(Ok(Some(frame))) => match codec.decode::<Envelope>(&frame) {
            Ok(Envelope {
                kind: PayloadKind::ClientConnect { name },
                ..
            }) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                info!(%connection_id, "invalid handshake, closing");
                let _ = sink.close().await;
                return Ok(());
            }
        },
    };

    let id = registry.next_client_id();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
    let client = RoomClient::new(id, &name, outbound_tx);

    // Writer pump: everything the room layer queues for this client goes
    // out through here. It ends once every sender handle is dropped.
    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            let frame = match codec.encode(&envelope) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(client_id = %id, %error, "dropping unencodable envelope");
                    continue;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    client.send(Envelope::from_client(id, PayloadKind::ClientId { name: name.clone() }));
    if let Err(error) = registry.join_room(LOBBY_ROOM, &client) {
        warn!(client_id = %id, %error, "lobby join failed");
    }
    info!(client_id = %id, name = %name, "client connected");

    loop {
        let frame = match stream.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(error) => {
                debug!(client_id = %id, %error, "read failed");
                break;
            }
        };
        let envelope = match codec.decode::<Envelope>(&frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(client_id = %id, %error, "undecodable frame, closing connection");
                break;
            }
        };
        if !dispatch(&registry, &client, envelope) {
            break;
        }
    }

    if let Some(room) = client.room() {
        room.handle_disconnect(&client);
    }
    info!(client_id = %id, "client disconnected");

    // Dropping the client drops the last outbound sender, which lets the
    // writer flush and close the socket.
    drop(client);
    let _ = writer.await;
    Ok(())
}

/// Routes one inbound envelope. Returns `false` when the client asked to
/// disconnect.
fn dispatch(registry: &Arc<Registry>, client: &Arc<RoomClient>, envelope: Envelope) -> bool {
    match envelope.kind {
        PayloadKind::Disconnect => return false,

        PayloadKind::Message => {
            if let (Some(room), Some(text)) = (client.room(), envelope.message.as_deref()) {
                report(client, room.handle_message(client, text));
            }
        }
        PayloadKind::Reverse => {
            if let (Some(room), Some(text)) = (client.room(), envelope.message.as_deref()) {
                report(client, room.handle_reverse(client, text));
            }
        }

        PayloadKind::RoomCreate { room } => {
            let result = registry
                .create_room(&room)
                .and_then(|created| registry.join_room(created.name(), client));
            report(client, result.map(|_| ()));
        }
        PayloadKind::RoomJoin { room: Some(room), .. } => {
            report(client, registry.join_room(&room, client).map(|_| ()));
        }
        PayloadKind::RoomLeave { .. } => {
            report(client, registry.join_room(LOBBY_ROOM, client).map(|_| ()));
        }
        PayloadKind::RoomList { query, .. } => {
            let rooms = registry.list_rooms(query.as_deref().unwrap_or(""));
            client.send(Envelope::server(PayloadKind::RoomList { query, rooms }));
        }

        PayloadKind::Ready { .. } => game_action(client, |room| room.handle_ready(client)),
        PayloadKind::Turn { .. } => game_action(client, |room| room.handle_turn(client)),
        PayloadKind::Place { row, col } => {
            game_action(client, |room| room.handle_place(client, row, col));
        }
        PayloadKind::Attack { row, col } => {
            game_action(client, |room| room.handle_attack(client, row, col));
        }
        PayloadKind::Skip => game_action(client, |room| room.handle_skip(client)),

        // Server-to-client tags (and repeated handshakes) have no business
        // arriving here; log and carry on.
        other => {
            debug!(client_id = %client.id(), kind = ?other, "ignoring unexpected tag");
        }
    }
    true
}

fn game_action(
    client: &Arc<RoomClient>,
    action: impl FnOnce(&Room) -> Result<(), RoomError>,
) {
    match client.room() {
        Some(room) => report(client, action(&room)),
        None => {
            client.send_message(RoomError::NotGameRoom.to_string());
        }
    }
}

/// Game-rule violations and structural conflicts go back to the acting
/// client as plain text; nothing is propagated further.
fn report(client: &Arc<RoomClient>, result: Result<(), RoomError>) {
    if let Err(error) = result {
        debug!(client_id = %client.id(), %error, "action rejected");
        client.send_message(error.to_string());
    }
}
