pub mod error;
pub mod events;
pub mod models;

pub use error::{FeedError, StoreError, ValidationError};
pub use events::{FeedEvent, GatewayCommand, Notification, NoticeKind, StoreEvent};
pub use models::{Message, MessageDraft, RoomId, RoomInfo};
