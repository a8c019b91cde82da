//! Database role requests over the bus.

use astrolabe::channel::{database_broadcast_channel, Channel};
use astrolabe::datagram::{Datagram, MessageType};
use tokio_test::assert_ok;

use crate::common::*;

const CLIENT: Channel = 900;

fn create_avatar(context: u32, x: u32, name: &str) -> Datagram {
    Datagram::builder(CLIENT, MessageType::DbCreateObject)
        .to(DATABASE)
        .add_u32(context)
        .add_u16(AVATAR)
        .add_u16(2)
        .add_u16(X)
        .add_u32(x)
        .add_u16(NAME)
        .add_u16(name.len() as u16)
        .add_data(name.as_bytes())
        .build()
        .unwrap()
}

fn get_all(context: u32, do_id: u32) -> Datagram {
    Datagram::builder(CLIENT, MessageType::DbGetAll)
        .to(DATABASE)
        .add_u32(context)
        .add_u32(do_id)
        .build()
        .unwrap()
}

fn delete_object(do_id: u32) -> Datagram {
    Datagram::builder(CLIENT, MessageType::DbDeleteObject)
        .to(DATABASE)
        .add_u32(do_id)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_create_allocates_from_range() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut client = probe(&ctx, &[CLIENT]).await;

    ctx.bus().publish(create_avatar(7, 42, "ada")).await;
    ctx.bus().publish(create_avatar(8, 43, "bo")).await;

    let first = recv_kind(&mut client, MessageType::DbCreateObjectResp).await;
    assert_eq!(first.sender(), DATABASE);
    let mut it = first.reader();
    assert_eq!(assert_ok!(it.read_u32()), 7);
    assert_eq!(assert_ok!(it.read_u32()), 100_000);

    let second = recv_kind(&mut client, MessageType::DbCreateObjectResp).await;
    let mut it = second.reader();
    assert_eq!(assert_ok!(it.read_u32()), 8);
    assert_eq!(assert_ok!(it.read_u32()), 100_001);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_get_all_returns_stored_fields() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut client = probe(&ctx, &[CLIENT]).await;
    ctx.bus().publish(create_avatar(1, 42, "ada")).await;
    recv_kind(&mut client, MessageType::DbCreateObjectResp).await;

    ctx.bus().publish(get_all(2, 100_000)).await;

    let reply = recv_kind(&mut client, MessageType::DbGetAllResp).await;
    let mut it = reply.reader();
    assert_eq!(assert_ok!(it.read_u32()), 2);
    assert_eq!(assert_ok!(it.read_u8()), 1);
    assert_eq!(assert_ok!(it.read_u16()), AVATAR);
    assert_eq!(assert_ok!(it.read_u16()), 2);
    assert_eq!(assert_ok!(it.read_u16()), X);
    assert_eq!(assert_ok!(it.read_u32()), 42);
    assert_eq!(assert_ok!(it.read_u16()), NAME);
    assert_eq!(assert_ok!(it.read_u16()), 3);
    assert_eq!(&assert_ok!(it.read_data(3))[..], b"ada");
    assert!(it.is_empty());

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_get_all_unknown_object_reports_failure() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut client = probe(&ctx, &[CLIENT]).await;

    ctx.bus().publish(get_all(3, 123_456)).await;

    let reply = recv_kind(&mut client, MessageType::DbGetAllResp).await;
    let mut it = reply.reader();
    assert_eq!(assert_ok!(it.read_u32()), 3);
    assert_eq!(assert_ok!(it.read_u8()), 0);
    assert!(it.is_empty());

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_delete_is_broadcast_and_forgets_object() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut client = probe(&ctx, &[CLIENT]).await;
    let mut watcher = probe(&ctx, &[database_broadcast_channel(100_000)]).await;
    ctx.bus().publish(create_avatar(1, 42, "ada")).await;
    recv_kind(&mut client, MessageType::DbCreateObjectResp).await;

    ctx.bus().publish(delete_object(100_000)).await;

    let notice = recv(&mut watcher).await;
    assert_eq!(notice.kind(), Some(MessageType::DbDeleteObject));
    assert_eq!(notice.sender(), DATABASE);
    assert_eq!(assert_ok!(notice.reader().read_u32()), 100_000);

    ctx.bus().publish(get_all(4, 100_000)).await;
    let reply = recv_kind(&mut client, MessageType::DbGetAllResp).await;
    let mut it = reply.reader();
    assert_eq!(assert_ok!(it.read_u32()), 4);
    assert_eq!(assert_ok!(it.read_u8()), 0);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_malformed_create_gets_no_reply() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    let mut client = probe(&ctx, &[CLIENT]).await;

    let unknown_class = Datagram::builder(CLIENT, MessageType::DbCreateObject)
        .to(DATABASE)
        .add_u32(1)
        .add_u16(99)
        .add_u16(0)
        .build()
        .unwrap();
    let truncated = Datagram::builder(CLIENT, MessageType::DbCreateObject)
        .to(DATABASE)
        .add_u32(2)
        .add_u16(AVATAR)
        .add_u16(1)
        .add_u16(X)
        .add_u8(1)
        .build()
        .unwrap();
    ctx.bus().publish(unknown_class).await;
    ctx.bus().publish(truncated).await;

    assert_silent(&mut client).await;

    // the next valid request still gets the first id
    ctx.bus().publish(create_avatar(3, 1, "c")).await;
    let reply = recv_kind(&mut client, MessageType::DbCreateObjectResp).await;
    let mut it = reply.reader();
    assert_eq!(assert_ok!(it.read_u32()), 3);
    assert_eq!(assert_ok!(it.read_u32()), 100_000);

    runtime.shutdown().await;
}
