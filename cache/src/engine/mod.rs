pub mod channel;
pub mod dispatch;
pub mod entity_cache;
pub mod events;
pub mod member;
pub mod permissions;
pub mod registry;
pub mod role;
pub mod server;
pub mod update;
pub mod value;
