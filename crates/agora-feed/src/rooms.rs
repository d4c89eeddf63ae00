use std::sync::Arc;

use agora_store::{MessageStore, RoomWatch};
use agora_types::{RoomId, RoomInfo, StoreError};

/// Live-updating room list with administrative delete, for the room-list
/// view shown next to a feed. Dropping it releases the room-list
/// subscription.
pub struct RoomDirectory {
    store: Arc<dyn MessageStore>,
    rooms: Vec<RoomInfo>,
    watch: RoomWatch,
}

impl RoomDirectory {
    pub async fn open(store: Arc<dyn MessageStore>) -> Result<Self, StoreError> {
        let watch = store.watch_rooms().await?;
        let rooms = watch.initial().to_vec();
        Ok(Self {
            store,
            rooms,
            watch,
        })
    }

    pub fn rooms(&self) -> &[RoomInfo] {
        &self.rooms
    }

    /// Wait for the next room-list change and apply it. `None` when the
    /// store shuts down.
    pub async fn changed(&mut self) -> Option<Result<(), StoreError>> {
        match self.watch.next().await? {
            Ok(rooms) => {
                self.rooms = rooms;
                Some(Ok(()))
            }
            Err(err) => Some(Err(err)),
        }
    }

    /// Remove a room and its entire message collection.
    pub async fn delete_room(&self, room: &RoomId) -> Result<(), StoreError> {
        self.store.delete_room(room).await
    }
}
