use super::*;
use frames::{JoinRoom, ParticipantCount};
use std::future::Future;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::{WebSocketStream, accept_async};

type ServerSide = WebSocketStream<TcpStream>;

/// Accept one websocket connection and run `script` against it.
async fn fake_server<F, Fut>(script: F) -> String
where
    F: FnOnce(ServerSide) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let ws = accept_async(tcp).await.expect("handshake");
        script(ws).await;
    });
    format!("ws://{addr}/ws")
}

async fn recv(rx: &mut mpsc::Receiver<ServerMessage>) -> Option<ServerMessage> {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("inbound receive timed out")
}

async fn wait_for_state(transport: &Transport, wanted: ConnectionState) {
    let mut states = transport.subscribe();
    timeout(Duration::from_millis(500), states.wait_for(|s| *s == wanted))
        .await
        .expect("state wait timed out")
        .expect("state sender dropped");
}

#[tokio::test]
async fn inbound_frames_arrive_typed_and_malformed_ones_are_dropped() {
    let url = fake_server(|mut ws| async move {
        ws.send(Message::text("not json")).await.expect("send");
        ws.send(Message::text(r#"{"type":"mystery","data":{}}"#)).await.expect("send");
        ws.send(Message::text(r#"{"type":"joined","data":{"roomId":"room_a","participantCount":2}}"#))
            .await
            .expect("send");
        ws.send(Message::binary(br#"{"type":"newUserJoined","data":{}}"#.to_vec()))
            .await
            .expect("send");
        ws.close(None).await.expect("close");
    })
    .await;

    let (transport, mut inbound) = Transport::connect(&url).await.expect("connect");

    assert_eq!(
        recv(&mut inbound).await,
        Some(ServerMessage::Joined(ParticipantCount { room_id: "room_a".into(), participant_count: 2 }))
    );
    assert_eq!(recv(&mut inbound).await, Some(ServerMessage::NewUserJoined));
    assert_eq!(recv(&mut inbound).await, None, "channel closes with the socket");
    wait_for_state(&transport, ConnectionState::Closed).await;
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn send_writes_envelope_text() {
    let (seen_tx, mut seen_rx) = mpsc::channel::<String>(4);
    let url = fake_server(move |mut ws| async move {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = seen_tx.send(text.as_str().to_owned()).await;
            }
        }
    })
    .await;

    let (transport, _inbound) = Transport::connect(&url).await.expect("connect");
    assert!(transport.is_connected());
    assert!(transport.send(&ClientMessage::JoinRoom(JoinRoom { room_id: "room_b".into() })));

    let text = timeout(Duration::from_millis(500), seen_rx.recv())
        .await
        .expect("server receive timed out")
        .expect("server gone");
    let envelope = frames::decode_envelope(&text).expect("envelope");
    assert_eq!(envelope.kind, "joinRoom");
    assert_eq!(envelope.data["roomId"], "room_b");
}

#[tokio::test]
async fn close_ends_connection_and_later_sends_are_discarded() {
    let url = fake_server(|mut ws| async move { while ws.next().await.is_some() {} }).await;

    let (transport, mut inbound) = Transport::connect(&url).await.expect("connect");
    transport.close().await;

    wait_for_state(&transport, ConnectionState::Closed).await;
    assert!(!transport.send(&ClientMessage::CreateRoom));
    assert_eq!(recv(&mut inbound).await, None);
}

#[tokio::test]
async fn connect_failure_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let result = Transport::connect(&format!("ws://{addr}/ws")).await;
    assert!(matches!(result, Err(TransportError::Connect(_))));
}

#[tokio::test]
async fn observed_connect_publishes_every_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        // The TCP connect completes from the backlog; the handshake waits.
        let (tcp, _) = listener.accept().await.expect("accept");
        go_rx.await.expect("go signal");
        let mut ws = accept_async(tcp).await.expect("handshake");
        while ws.next().await.is_some() {}
    });

    let (state_tx, mut states) = watch::channel(ConnectionState::Disconnected);
    assert_eq!(*states.borrow(), ConnectionState::Disconnected);
    let url = format!("ws://{addr}/ws");
    let connecting = tokio::spawn(async move { Transport::connect_observed(&url, state_tx).await });

    timeout(Duration::from_millis(500), states.wait_for(|s| *s == ConnectionState::Connecting))
        .await
        .expect("connecting timed out")
        .expect("state sender dropped");

    go_tx.send(()).expect("release handshake");
    let (transport, _inbound) = timeout(Duration::from_millis(500), connecting)
        .await
        .expect("connect timed out")
        .expect("connect task")
        .expect("connect");
    assert_eq!(*states.borrow(), ConnectionState::Open);

    transport.close().await;
    timeout(Duration::from_millis(500), states.wait_for(|s| *s == ConnectionState::Closed))
        .await
        .expect("closed timed out")
        .expect("state sender dropped");
}

#[tokio::test]
async fn observed_connect_failure_ends_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let (state_tx, states) = watch::channel(ConnectionState::Disconnected);
    let result = Transport::connect_observed(&format!("ws://{addr}/ws"), state_tx).await;

    assert!(matches!(result, Err(TransportError::Connect(_))));
    assert_eq!(*states.borrow(), ConnectionState::Closed);
}
