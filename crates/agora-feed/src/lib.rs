pub mod controller;
pub mod rooms;

pub use controller::{Feed, FeedConfig, FeedSnapshot, FeedState};
pub use rooms::RoomDirectory;
