//! Room lifecycle: creation rules, renaming, the room list, notices,
//! and the media gallery.

mod common;

use atelier_chat::store::NewMessage;
use atelier_chat::{
    Attachment, AttachmentKind, ChatError, ChatCore, CreateRoom, MediaFilter, MessageKind, Role,
    RoomFilter, RoomKind,
};
use common::*;
use std::time::Duration;

const NAMES: &[(&str, &str)] = &[
    ("alice", "Alice"),
    ("bob", "Bob"),
    ("carol", "Carol"),
    ("dave", "Dave"),
];

async fn make_room(owner: &ChatCore, title: &str, members: &[&str]) -> String {
    owner
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Team,
            title: title.to_string(),
            member_ids: members.iter().map(|m| m.to_string()).collect(),
            owner_id: None,
            project_id: None,
            collaboration_id: None,
            image_url: None,
        })
        .await
        .expect("create room")
        .id
}

fn image(url: &str) -> Attachment {
    Attachment {
        kind: AttachmentKind::Image,
        url: url.to_string(),
        name: url.to_string(),
        size: Some(1024),
    }
}

async fn post(db: &atelier_chat::Database, room_id: &str, sender: &str, content: &str) {
    db.messages()
        .insert(NewMessage {
            room_id: room_id.to_string(),
            sender_id: sender.to_string(),
            content: Some(content.to_string()),
            attachments: Vec::new(),
            kind: MessageKind::Text,
        })
        .await
        .expect("insert message");
}

#[tokio::test]
async fn room_creation_validates_input() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);

    let err = alice
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Team,
            title: "   ".to_string(),
            member_ids: vec!["bob".to_string()],
            owner_id: None,
            project_id: None,
            collaboration_id: None,
            image_url: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    // A partner room has exactly one counterpart.
    let err = alice
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Partner,
            title: "Pair".to_string(),
            member_ids: vec!["bob".to_string(), "carol".to_string()],
            owner_id: None,
            project_id: None,
            collaboration_id: None,
            image_url: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn rooms_can_be_opened_on_anothers_behalf() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);

    let room = alice
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Project,
            title: "Handoff".to_string(),
            member_ids: vec!["alice".to_string(), "carol".to_string()],
            owner_id: Some("bob".to_string()),
            project_id: None,
            collaboration_id: None,
            image_url: None,
        })
        .await
        .expect("create room");
    assert_eq!(room.created_by, "bob");

    let bob = session_on(&db, "bob", NAMES);
    assert_eq!(
        bob.participants().my_role(&room.id).await.expect("role"),
        Some(Role::Owner)
    );
    assert_eq!(
        alice.participants().my_role(&room.id).await.expect("role"),
        Some(Role::Member)
    );
}

#[tokio::test]
async fn blocked_users_cannot_open_partner_rooms() {
    let db = open_db().await;
    let alice = ChatCore::attach(
        db.clone(),
        &test_config(),
        "alice",
        StaticDirectory::with(NAMES),
        StaticBlocks::between(&[("alice", "dave")]),
    );

    let err = alice
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Partner,
            title: "Pair".to_string(),
            member_ids: vec!["dave".to_string()],
            owner_id: None,
            project_id: None,
            collaboration_id: None,
            image_url: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Permission(_)));
}

#[tokio::test]
async fn renaming_is_owner_only() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = make_room(&alice, "Before", &["bob"]).await;

    let bob = session_on(&db, "bob", NAMES);
    let err = bob.rooms().rename(&room_id, "Hijacked").await.unwrap_err();
    assert!(matches!(err, ChatError::Permission(_)));

    alice.rooms().rename(&room_id, "After").await.expect("rename");
    let room = db.rooms().find(&room_id).await.expect("find").expect("room");
    assert_eq!(room.title, "After");
}

#[tokio::test]
async fn room_list_sorts_pins_first_then_activity() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let quiet = make_room(&alice, "Quiet", &["bob"]).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let busy = make_room(&alice, "Busy", &["bob"]).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    post(&db, &busy, "bob", "latest word").await;

    let list = alice
        .rooms()
        .list_rooms(RoomFilter::All)
        .await
        .expect("list");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, busy);
    assert_eq!(list[0].last_message, "latest word");
    assert_eq!(list[0].unread, 1);

    // Pinning overrides activity order.
    alice
        .participants()
        .set_pinned(&quiet, true)
        .await
        .expect("pin");
    let list = alice
        .rooms()
        .list_rooms(RoomFilter::All)
        .await
        .expect("list");
    assert_eq!(list[0].id, quiet);
    assert!(list[0].pinned);
}

#[tokio::test]
async fn room_list_hides_blocked_partner_rooms() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    alice
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Partner,
            title: String::new(),
            member_ids: vec!["dave".to_string()],
            owner_id: None,
            project_id: None,
            collaboration_id: None,
            image_url: None,
        })
        .await
        .expect("create partner room");

    // An untitled partner room renders the counterpart's name.
    let list = alice
        .rooms()
        .list_rooms(RoomFilter::All)
        .await
        .expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].title, "Dave");

    // The same session with dave blocked no longer sees the room.
    let blocked_alice = ChatCore::attach(
        db.clone(),
        &test_config(),
        "alice",
        StaticDirectory::with(NAMES),
        StaticBlocks::between(&[("alice", "dave")]),
    );
    let list = blocked_alice
        .rooms()
        .list_rooms(RoomFilter::All)
        .await
        .expect("list");
    assert!(list.is_empty());
}

#[tokio::test]
async fn notice_pin_and_clear() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = make_room(&alice, "Studio", &["carol"]).await;
    post(&db, &room_id, "alice", "read the brief first").await;
    let message_id = db
        .messages()
        .last_for_room(&room_id)
        .await
        .expect("last")
        .expect("message")
        .id;

    let carol = session_on(&db, "carol", NAMES);
    let err = carol
        .rooms()
        .set_notice(&room_id, &message_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Permission(_)));

    alice
        .rooms()
        .set_notice(&room_id, &message_id)
        .await
        .expect("set notice");
    let notice = alice
        .rooms()
        .notice(&room_id)
        .await
        .expect("notice")
        .expect("set");
    assert_eq!(notice.content, "read the brief first");
    assert_eq!(notice.sender_name, "Alice");

    alice.rooms().clear_notice(&room_id).await.expect("clear");
    assert!(alice.rooms().notice(&room_id).await.expect("notice").is_none());

    let err = alice
        .rooms()
        .set_notice(&room_id, "no-such-message")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn media_gallery_pages_and_filters() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = make_room(&alice, "Studio", &["carol"]).await;

    db.messages()
        .insert(NewMessage {
            room_id: room_id.clone(),
            sender_id: "carol".to_string(),
            content: None,
            attachments: vec![image("one.png")],
            kind: MessageKind::Text,
        })
        .await
        .expect("insert");
    tokio::time::sleep(Duration::from_millis(5)).await;
    db.messages()
        .insert(NewMessage {
            room_id: room_id.clone(),
            sender_id: "alice".to_string(),
            content: Some("deck attached".to_string()),
            attachments: vec![
                image("two.png"),
                Attachment {
                    kind: AttachmentKind::File,
                    url: "deck.pdf".to_string(),
                    name: "deck.pdf".to_string(),
                    size: Some(9000),
                },
            ],
            kind: MessageKind::Text,
        })
        .await
        .expect("insert");

    let all = alice
        .rooms()
        .media(&room_id, MediaFilter::All, None, None)
        .await
        .expect("media");
    assert_eq!(all.len(), 3);
    // Newest message's attachments come first.
    assert_eq!(all[0].url, "two.png");
    assert_eq!(all[2].url, "one.png");
    assert_eq!(all[2].sender_name, "Carol");

    let images = alice
        .rooms()
        .media(&room_id, MediaFilter::Image, None, None)
        .await
        .expect("media");
    assert_eq!(images.len(), 2);

    let older = alice
        .rooms()
        .media(&room_id, MediaFilter::All, Some(all[0].created_at), None)
        .await
        .expect("media");
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].url, "one.png");
}

#[tokio::test]
async fn media_deletion_rights_and_cleanup() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = make_room(&alice, "Studio", &["carol", "dave"]).await;

    let record = db
        .messages()
        .insert(NewMessage {
            room_id: room_id.clone(),
            sender_id: "carol".to_string(),
            content: None,
            attachments: vec![image("one.png")],
            kind: MessageKind::Text,
        })
        .await
        .expect("insert");

    // Another member cannot delete carol's attachment.
    let dave = session_on(&db, "dave", NAMES);
    let err = dave
        .rooms()
        .delete_media(&room_id, &record.id, "one.png")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Permission(_)));

    // The owner can; an attachment-only message with nothing left is
    // removed entirely.
    alice
        .rooms()
        .delete_media(&room_id, &record.id, "one.png")
        .await
        .expect("delete media");
    assert!(db.messages().find(&record.id).await.expect("find").is_none());
}

#[tokio::test]
async fn rooms_resolve_by_project_for_members_only() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    alice
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Project,
            title: "Spring drop".to_string(),
            member_ids: vec![],
            owner_id: None,
            project_id: Some("p1".to_string()),
            collaboration_id: None,
            image_url: None,
        })
        .await
        .expect("create room");

    let found = alice
        .rooms()
        .room_by_project("p1")
        .await
        .expect("lookup")
        .expect("visible to member");
    assert_eq!(found.project_id.as_deref(), Some("p1"));

    let bob = session_on(&db, "bob", NAMES);
    assert!(bob.rooms().room_by_project("p1").await.expect("lookup").is_none());
    assert!(
        alice
            .rooms()
            .room_by_project("p2")
            .await
            .expect("lookup")
            .is_none()
    );
}
