//! Authority propagation from parents to children over the bus.

use std::sync::Arc;

use astrolabe::channel::{location_channel, Channel};
use astrolabe::config::{RoleConfig, StateServerConfig};
use astrolabe::datagram::MessageType;
use astrolabe::runtime::Runtime;
use astrolabe::schema::StaticCatalog;

use crate::common::*;

const ZONE_OBJECT: u32 = 500;
const AI: Channel = 7000;

async fn authority_of(ctx: &astrolabe::context::ServerContext, do_id: u32) -> (Channel, bool) {
    let entry = ctx.directory().get(do_id).await.unwrap();
    let object = entry.object.lock().await;
    (object.authority(), object.is_authority_explicit())
}

#[tokio::test]
async fn test_children_inherit_parent_authority() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    generate_and_wait(&ctx, generate_zone(10, 1, ZONE_OBJECT, "plaza"), location_channel(10, 1)).await;
    generate_and_wait(&ctx, generate_avatar(ZONE_OBJECT, 5, 100, 42), location_channel(ZONE_OBJECT, 5)).await;
    let mut ai = probe(&ctx, &[AI]).await;

    ctx.bus().publish(set_authority(1, ZONE_OBJECT, AI)).await;

    let first = recv_kind(&mut ai, MessageType::ObjectEnterAuthority).await;
    let second = recv_kind(&mut ai, MessageType::ObjectEnterAuthority).await;
    assert_eq!(snapshot_do_id(first.body()), ZONE_OBJECT);
    assert_eq!(snapshot_do_id(second.body()), 100);
    assert_eq!(authority_of(&ctx, 100).await, (AI, false));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_explicit_authority_survives_parent_change() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    generate_and_wait(&ctx, generate_zone(10, 1, ZONE_OBJECT, "plaza"), location_channel(10, 1)).await;
    generate_and_wait(&ctx, generate_avatar(ZONE_OBJECT, 5, 100, 42), location_channel(ZONE_OBJECT, 5)).await;
    let mut own = probe(&ctx, &[8000]).await;
    let mut parent_ai = probe(&ctx, &[AI]).await;

    ctx.bus().publish(set_authority(1, 100, 8000)).await;
    recv_kind(&mut own, MessageType::ObjectEnterAuthority).await;

    ctx.bus().publish(set_authority(1, ZONE_OBJECT, AI)).await;
    let enter = recv_kind(&mut parent_ai, MessageType::ObjectEnterAuthority).await;
    assert_eq!(snapshot_do_id(enter.body()), ZONE_OBJECT);
    assert_silent(&mut parent_ai).await;
    assert_silent(&mut own).await;
    assert_eq!(authority_of(&ctx, 100).await, (8000, true));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_new_child_asks_parent_for_authority() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    generate_and_wait(&ctx, generate_zone(10, 1, ZONE_OBJECT, "plaza"), location_channel(10, 1)).await;
    let mut ai = probe(&ctx, &[AI]).await;
    ctx.bus().publish(set_authority(1, ZONE_OBJECT, AI)).await;
    recv_kind(&mut ai, MessageType::ObjectEnterAuthority).await;

    ctx.bus()
        .publish(generate_avatar(ZONE_OBJECT, 5, 100, 42))
        .await;

    let enter = recv_kind(&mut ai, MessageType::ObjectEnterAuthority).await;
    assert_eq!(snapshot_do_id(enter.body()), 100);
    assert_eq!(authority_of(&ctx, 100).await, (AI, false));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_airecv_update_reaches_authority() {
    let runtime = start_runtime().await;
    let ctx = runtime.context().clone();
    generate_and_wait(&ctx, generate_avatar(1, 5, 100, 42), location_channel(1, 5)).await;
    let mut ai = probe(&ctx, &[AI]).await;
    let mut location = probe(&ctx, &[location_channel(1, 5)]).await;
    ctx.bus().publish(set_authority(1, 100, AI)).await;
    recv_kind(&mut ai, MessageType::ObjectEnterAuthority).await;

    ctx.bus()
        .publish(update_field(555, 100, HP, &u32_bytes(80)))
        .await;

    let notice = recv_kind(&mut ai, MessageType::ObjectUpdateField).await;
    assert_eq!(notice.recipients(), &[AI, 555]);
    assert_silent(&mut location).await;

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_lazy_scope_subscription_waits_for_zone_change() {
    let mut config = config();
    config.roles = vec![RoleConfig::Stateserver(StateServerConfig {
        control: STATESERVER,
        eager_scope_subscription: false,
    })];
    let catalog = StaticCatalog::from_yaml(SCHEMA).unwrap();
    let runtime = Runtime::start(&config, Arc::new(catalog)).await.unwrap();
    let ctx = runtime.context().clone();
    generate_and_wait(&ctx, generate_zone(10, 1, ZONE_OBJECT, "plaza"), location_channel(10, 1)).await;
    generate_and_wait(&ctx, generate_avatar(ZONE_OBJECT, 5, 100, 42), location_channel(ZONE_OBJECT, 5)).await;
    let mut ai = probe(&ctx, &[AI]).await;

    ctx.bus().publish(set_authority(1, ZONE_OBJECT, AI)).await;
    let enter = recv_kind(&mut ai, MessageType::ObjectEnterAuthority).await;
    assert_eq!(snapshot_do_id(enter.body()), ZONE_OBJECT);
    assert_silent(&mut ai).await;
    assert_eq!(authority_of(&ctx, 100).await, (0, false));

    // a zone change joins the scope channel and re-queries the parent
    ctx.bus().publish(set_zone(555, 100, ZONE_OBJECT, 6)).await;
    let enter = recv_kind(&mut ai, MessageType::ObjectEnterAuthority).await;
    assert_eq!(snapshot_do_id(enter.body()), 100);

    runtime.shutdown().await;
}
