//! Invitation lifecycle: batch partitioning, accept with rollback
//! semantics, reject, withdraw, and expiry.

mod common;

use atelier_chat::{ChatError, CreateRoom, InvitationStatus, Role, RoomKind};
use common::*;

const NAMES: &[(&str, &str)] = &[
    ("alice", "Alice"),
    ("bob", "Bob"),
    ("carol", "Carol"),
    ("dave", "Dave"),
];

async fn room_with_bob(owner: &atelier_chat::ChatCore) -> String {
    owner
        .rooms()
        .create_room(CreateRoom {
            kind: RoomKind::Team,
            title: "Campaign".to_string(),
            member_ids: vec!["bob".to_string()],
            owner_id: None,
            project_id: None,
            collaboration_id: None,
            image_url: None,
        })
        .await
        .expect("create room")
        .id
}

#[tokio::test]
async fn invite_partitions_invitees() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;

    let outcome = alice
        .invitations()
        .invite(
            &room_id,
            &["bob".to_string(), "carol".to_string(), "carol".to_string()],
            Some("join us"),
        )
        .await
        .expect("invite");
    assert_eq!(outcome.sent, 1);
    assert_eq!(outcome.already_in_room, 1);
    assert_eq!(outcome.already_invited, 0);

    // A second round finds carol already pending.
    let outcome = alice
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .expect("invite again");
    assert_eq!(outcome.sent, 0);
    assert_eq!(outcome.already_invited, 1);

    // The invite is announced in the room.
    let announced = db
        .messages()
        .list(&room_id)
        .await
        .expect("list")
        .iter()
        .any(|m| m.content.as_deref() == Some("Alice invited Carol."));
    assert!(announced);
}

#[tokio::test]
async fn members_cannot_invite() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;

    let bob = session_on(&db, "bob", NAMES);
    let err = bob
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Permission(_)));
}

#[tokio::test]
async fn accept_joins_room_and_is_idempotent() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;
    alice
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .expect("invite");

    let carol = session_on(&db, "carol", NAMES);
    let inbox = carol.invitations().received().await.expect("inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].room_title, "Campaign");
    assert_eq!(inbox[0].inviter_name, "Alice");
    assert_eq!(carol.invitations().received_count().await.unwrap(), 1);

    let joined = carol
        .invitations()
        .accept(&inbox[0].id)
        .await
        .expect("accept");
    assert_eq!(joined, room_id);
    assert!(
        db.participants()
            .get(&room_id, "carol")
            .await
            .expect("get")
            .is_some()
    );

    // Double accept short-circuits to the same room instead of failing.
    let again = carol
        .invitations()
        .accept(&inbox[0].id)
        .await
        .expect("double accept");
    assert_eq!(again, room_id);

    let announced = db
        .messages()
        .list(&room_id)
        .await
        .expect("list")
        .iter()
        .any(|m| m.content.as_deref() == Some("Carol joined the room."));
    assert!(announced);
}

#[tokio::test]
async fn failed_join_rolls_the_invitation_back_to_pending() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;
    alice
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .expect("invite");

    let carol = session_on(&db, "carol", NAMES);
    let invitation_id = carol.invitations().received().await.expect("inbox")[0]
        .id
        .clone();

    // Force the membership insert to fail: a conflicting participant row
    // already exists when the accept lands.
    db.participants()
        .insert(&room_id, "carol", Role::Member)
        .await
        .expect("insert participant");

    let err = carol
        .invitations()
        .accept(&invitation_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Db(_)));

    // The invitation is not left consumed: it is pending and unanswered
    // again.
    let invitation = db
        .invitations()
        .find(&invitation_id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(invitation.status, InvitationStatus::Pending);
    assert!(invitation.responded_at.is_none());
}

#[tokio::test]
async fn only_the_invitee_can_answer() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;
    alice
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .expect("invite");

    let carol = session_on(&db, "carol", NAMES);
    let invitation_id = carol.invitations().received().await.expect("inbox")[0]
        .id
        .clone();

    let bob = session_on(&db, "bob", NAMES);
    let err = bob.invitations().accept(&invitation_id).await.unwrap_err();
    assert!(matches!(err, ChatError::Authorization(_)));
    let err = bob.invitations().reject(&invitation_id).await.unwrap_err();
    assert!(matches!(err, ChatError::Authorization(_)));
}

#[tokio::test]
async fn rejected_invitations_are_terminal() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;
    alice
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .expect("invite");

    let carol = session_on(&db, "carol", NAMES);
    let invitation_id = carol.invitations().received().await.expect("inbox")[0]
        .id
        .clone();
    carol
        .invitations()
        .reject(&invitation_id)
        .await
        .expect("reject");

    let err = carol.invitations().accept(&invitation_id).await.unwrap_err();
    assert!(matches!(err, ChatError::State(_)));
    assert!(carol.invitations().received().await.unwrap().is_empty());

    // A fresh invite replaces the rejected row with a new lifecycle.
    let outcome = alice
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .expect("reinvite");
    assert_eq!(outcome.sent, 1);
    let fresh = carol.invitations().received().await.expect("inbox");
    assert_eq!(fresh.len(), 1);
    assert_ne!(fresh[0].id, invitation_id);
}

#[tokio::test]
async fn withdraw_is_inviter_only() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;
    alice
        .invitations()
        .invite(&room_id, &["carol".to_string()], None)
        .await
        .expect("invite");

    let carol = session_on(&db, "carol", NAMES);
    let invitation_id = carol.invitations().received().await.expect("inbox")[0]
        .id
        .clone();

    let err = carol
        .invitations()
        .withdraw(&invitation_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Authorization(_)));

    alice
        .invitations()
        .withdraw(&invitation_id)
        .await
        .expect("withdraw");
    assert!(carol.invitations().received().await.unwrap().is_empty());
    let err = carol.invitations().accept(&invitation_id).await.unwrap_err();
    assert!(matches!(err, ChatError::State(_)));
}

#[tokio::test]
async fn expired_invitations_cannot_be_accepted() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;

    // A pending row already past its expiry instant.
    let stale = db
        .invitations()
        .insert(&room_id, "alice", "dave", None, 1)
        .await
        .expect("insert");

    let dave = session_on(&db, "dave", NAMES);
    assert!(dave.invitations().received().await.unwrap().is_empty());
    assert_eq!(dave.invitations().received_count().await.unwrap(), 0);

    let err = dave.invitations().accept(&stale.id).await.unwrap_err();
    assert!(matches!(err, ChatError::Expired));

    // The touch flipped the row to its terminal status.
    let row = db
        .invitations()
        .find(&stale.id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(row.status, InvitationStatus::Expired);
    assert!(
        db.participants()
            .get(&room_id, "dave")
            .await
            .expect("get")
            .is_none()
    );
}

#[tokio::test]
async fn sent_pending_lists_outstanding_invitations() {
    let db = open_db().await;
    let alice = session_on(&db, "alice", NAMES);
    let room_id = room_with_bob(&alice).await;
    alice
        .invitations()
        .invite(&room_id, &["carol".to_string(), "dave".to_string()], None)
        .await
        .expect("invite");

    let pending = alice
        .invitations()
        .sent_pending(&room_id)
        .await
        .expect("sent pending");
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|v| v.status == InvitationStatus::Pending));

    let outsider = session_on(&db, "dave", NAMES);
    let err = outsider.invitations().sent_pending(&room_id).await.unwrap_err();
    assert!(matches!(err, ChatError::Permission(_)));
}
