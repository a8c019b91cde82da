//! Network participants over a loopback TCP connection.

use std::time::Duration;

use astrolabe::channel::{location_channel, Channel};
use astrolabe::datagram::{Datagram, MessageType};
use astrolabe::network::{encode_control, read_frame, write_frame};
use tokio::net::TcpStream;

use crate::common::*;

const CLIENT: Channel = 555;

async fn connect(addr: std::net::SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connects to listener")
}

async fn control(stream: &mut TcpStream, msg_type: MessageType, channel: Channel) {
    write_frame(stream, &encode_control(msg_type, channel))
        .await
        .unwrap();
}

async fn send(stream: &mut TcpStream, dg: &Datagram) {
    write_frame(stream, &dg.encode()).await.unwrap();
}

async fn next_datagram(stream: &mut TcpStream) -> Datagram {
    let frame = tokio::time::timeout(Duration::from_secs(2), read_frame(stream))
        .await
        .expect("frame within timeout")
        .unwrap()
        .expect("stream open");
    Datagram::decode(frame).unwrap()
}

async fn assert_no_frame(stream: &mut TcpStream) {
    let waited = tokio::time::timeout(Duration::from_millis(150), read_frame(stream)).await;
    assert!(waited.is_err(), "unexpected frame: {:?}", waited);
}

/// Wait until exactly `count` participants listen on `channel`.
async fn wait_for_subscribers(ctx: &astrolabe::context::ServerContext, channel: Channel, count: usize) {
    for _ in 0..100 {
        if ctx.bus().subscribers(channel).await.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("channel {channel} never reached {count} subscribers");
}

#[tokio::test]
async fn test_client_generates_and_observes_object() {
    let runtime = start_runtime().await;
    let addr = runtime.listen_addr().unwrap();
    let mut stream = connect(addr).await;
    let location = location_channel(1, 5);

    control(&mut stream, MessageType::ControlAddChannel, CLIENT).await;
    control(&mut stream, MessageType::ControlAddChannel, location).await;
    send(&mut stream, &generate_avatar(1, 5, 100, 42)).await;

    let enter = next_datagram(&mut stream).await;
    assert_eq!(enter.kind(), Some(MessageType::ObjectEnterZoneWithRequired));
    assert_eq!(snapshot_do_id(enter.body()), 100);

    send(&mut stream, &update_field(CLIENT, 100, X, &u32_bytes(7))).await;
    let notice = next_datagram(&mut stream).await;
    assert_eq!(notice.kind(), Some(MessageType::ObjectUpdateField));
    assert_eq!(notice.recipients(), &[location, CLIENT]);
    assert_eq!(notice.sender(), CLIENT);
    let mut it = notice.reader();
    assert_eq!(it.read_u32().unwrap(), 100);
    assert_eq!(it.read_u16().unwrap(), X);
    assert_eq!(it.read_u32().unwrap(), 7);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_remove_channel_stops_delivery() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut stream = connect(runtime.listen_addr().unwrap()).await;
    let location = location_channel(1, 5);
    control(&mut stream, MessageType::ControlAddChannel, location).await;
    wait_for_subscribers(&ctx, location, 1).await;

    generate_and_wait(&ctx, generate_avatar(1, 5, 100, 42), location).await;
    next_datagram(&mut stream).await;

    control(&mut stream, MessageType::ControlRemoveChannel, location).await;
    // the helper probe from generate_and_wait remains
    wait_for_subscribers(&ctx, location, 1).await;
    ctx.bus()
        .publish(update_field(CLIENT, 100, X, &u32_bytes(9)))
        .await;

    assert_no_frame(&mut stream).await;

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_client_datagrams_reach_bus_participants() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut listener = probe(&ctx, &[777]).await;
    let mut stream = connect(runtime.listen_addr().unwrap()).await;
    control(&mut stream, MessageType::ControlAddChannel, 777).await;
    wait_for_subscribers(&ctx, 777, 2).await;

    let hello = Datagram::builder(CLIENT, 12345u16)
        .to(777)
        .add_data(b"hello")
        .build()
        .unwrap();
    send(&mut stream, &hello).await;

    let received = recv(&mut listener).await;
    assert_eq!(*received, hello);
    // the sending connection is not echoed its own datagram
    assert_no_frame(&mut stream).await;

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_releases_subscriptions() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut stream = connect(runtime.listen_addr().unwrap()).await;
    control(&mut stream, MessageType::ControlAddChannel, CLIENT).await;
    wait_for_subscribers(&ctx, CLIENT, 1).await;

    drop(stream);

    wait_for_subscribers(&ctx, CLIENT, 0).await;

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut stream = connect(runtime.listen_addr().unwrap()).await;

    write_frame(&mut stream, &[0xff]).await.unwrap();
    control(&mut stream, MessageType::ControlAddChannel, CLIENT).await;
    wait_for_subscribers(&ctx, CLIENT, 1).await;

    let ping = Datagram::builder(1, 12345u16).to(CLIENT).build().unwrap();
    ctx.bus().publish(ping.clone()).await;
    assert_eq!(next_datagram(&mut stream).await, ping);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_oversized_datagram_skipped_without_stalling_connection() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut stream = connect(runtime.listen_addr().unwrap()).await;
    control(&mut stream, MessageType::ControlAddChannel, 77).await;
    wait_for_subscribers(&ctx, 77, 1).await;

    let oversized = Datagram::builder(1, 12345u16)
        .to(77)
        .add_data(&vec![0u8; 70_000])
        .build()
        .unwrap();
    let small = Datagram::builder(1, 12345u16)
        .to(77)
        .add_u32(4)
        .build()
        .unwrap();
    assert_eq!(ctx.bus().publish(oversized).await, 1);
    assert_eq!(ctx.bus().publish(small.clone()).await, 1);

    assert_eq!(next_datagram(&mut stream).await, small);
    assert_eq!(ctx.bus().subscribers(77).await.len(), 1);

    runtime.shutdown().await;
}
