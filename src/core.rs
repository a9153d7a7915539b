//! Session facade wiring the store, services, and background tasks
//! together for one signed-in user.

use crate::config::ChatConfig;
use crate::delivery::DeliveryEngine;
use crate::directory::{BlockService, UserDirectory};
use crate::error::ChatResult;
use crate::invitations::InvitationService;
use crate::messages::MessageService;
use crate::participants::ParticipantService;
use crate::realtime::RealtimeSync;
use crate::rooms::RoomService;
use crate::session::SessionState;
use crate::store::Database;
use crate::types::MessageView;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct ChatCore {
    session: Arc<SessionState>,
    realtime: Arc<RealtimeSync>,
    delivery: DeliveryEngine,
    messages: MessageService,
    participants: ParticipantService,
    invitations: InvitationService,
    rooms: RoomService,
    monitor: JoinHandle<()>,
}

impl ChatCore {
    /// Open the store and start a session for `user_id`. The room-list
    /// pump and the delivery delay monitor start immediately.
    pub async fn connect(
        config: &ChatConfig,
        user_id: &str,
        directory: Arc<dyn UserDirectory>,
        blocks: Arc<dyn BlockService>,
    ) -> ChatResult<Self> {
        let db = Database::new(&config.database.path).await?;
        Ok(Self::attach(db, config, user_id, directory, blocks))
    }

    /// Start a session on an already-open store. Sessions attached to
    /// the same [`Database`] share its change feed, so each sees the
    /// others' writes in realtime.
    pub fn attach(
        db: Database,
        config: &ChatConfig,
        user_id: &str,
        directory: Arc<dyn UserDirectory>,
        blocks: Arc<dyn BlockService>,
    ) -> Self {
        let session = Arc::new(SessionState::new(user_id));

        let realtime = Arc::new(RealtimeSync::new(
            db.clone(),
            directory.clone(),
            session.clone(),
        ));
        realtime.subscribe_room_list();

        let delivery = DeliveryEngine::new(
            db.clone(),
            blocks.clone(),
            session.clone(),
            config.delivery,
        );
        let monitor = delivery.spawn_delay_monitor();

        info!(user = %user_id, "Chat session started");
        Self {
            messages: MessageService::new(db.clone(), directory.clone(), session.clone()),
            participants: ParticipantService::new(db.clone(), directory.clone(), session.clone()),
            invitations: InvitationService::new(
                db.clone(),
                directory.clone(),
                session.clone(),
                config.invitations,
            ),
            rooms: RoomService::new(db, directory, blocks, session.clone()),
            session,
            realtime,
            delivery,
            monitor,
        }
    }

    /// Enter a room: subscribe its pump, seed the cache from the store,
    /// and mark it read.
    pub async fn open_room(&self, room_id: &str) -> ChatResult<Vec<MessageView>> {
        self.session.set_current_room(Some(room_id));
        self.realtime.subscribe(room_id);
        let views = self.messages.get_messages(room_id).await?;
        self.participants.mark_read(room_id).await?;
        Ok(views)
    }

    /// Leave the room view. The pump stops; the cache stays for a fast
    /// reopen.
    pub fn close_room(&self, room_id: &str) {
        if self.session.is_current_room(room_id) {
            self.session.set_current_room(None);
        }
        self.realtime.unsubscribe(room_id);
    }

    /// Current cached timeline for a room.
    pub fn room_timeline(&self, room_id: &str) -> Vec<MessageView> {
        self.session.cache(room_id).snapshot()
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn realtime(&self) -> &Arc<RealtimeSync> {
        &self.realtime
    }

    pub fn delivery(&self) -> &DeliveryEngine {
        &self.delivery
    }

    pub fn messages(&self) -> &MessageService {
        &self.messages
    }

    pub fn participants(&self) -> &ParticipantService {
        &self.participants
    }

    pub fn invitations(&self) -> &InvitationService {
        &self.invitations
    }

    pub fn rooms(&self) -> &RoomService {
        &self.rooms
    }

    /// Stop all background tasks.
    pub fn shutdown(&self) {
        self.monitor.abort();
        self.realtime.shutdown();
        info!(user = %self.session.user_id, "Chat session stopped");
    }
}

impl Drop for ChatCore {
    fn drop(&mut self) {
        self.monitor.abort();
        self.realtime.shutdown();
    }
}
