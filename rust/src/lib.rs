mod chat;
mod chat_cache;
mod clock;
mod collection;
mod config;
mod context;
mod entity;
mod envelope;
mod feedback;
pub mod fetch;
pub mod list;
mod logging;
mod mutation;
mod notifications;
mod remote;
mod state;
mod temp_id;
mod updates;

pub use chat::{reconcile, ChatMessage, ChatStore, OutgoingMessage, CONFIRM_TOLERANCE_MS};
pub use chat_cache::{CacheError, CachedChat, ChatCache, CHAT_CACHE_LIMIT};
pub use clock::{now_millis, Clock, ManualClock, SystemClock};
pub use collection::{EntityService, OptimisticCollection, RemoteCollection};
pub use config::{load_sync_config, SyncConfig, CONFIG_FILE_NAME};
pub use context::{SyncContext, CHAT_COLLECTION, NOTIFICATIONS_COLLECTION};
pub use entity::{Entity, PendingAction, PendingKind, PendingMeta, Tracked};
pub use envelope::{settle, Envelope, RemoteResult, FALLBACK_ERROR};
pub use feedback::{FeedbackCue, FeedbackSink};
pub use fetch::{
    FetchOutcome, FetchState, LazyFetch, Liveness, ParallelFetch, ParallelState, SingleFetch,
};
pub use logging::init_logging;
pub use mutation::{MutationFailure, MutationHooks, OptimisticMutation};
pub use notifications::{Notification, NotificationStore, ReadGuard, MARK_ALL_READ_GUARD_MS};
pub use remote::{HttpRemote, RemoteError, ACTOR_HEADER};
pub use state::SyncState;
pub use temp_id::{generate_temp_id, has_temp_prefix, is_temp_id, TEMP_ID_PREFIX};
pub use updates::StoreUpdate;

/// The `plantops_config.json` written when a data dir has none.
pub fn default_config_json() -> String {
    serde_json::json!({
        "remote_base_url": null,
        "disable_network": false,
        "request_timeout_ms": 10_000,
        "actor_id": null,
        "chat_cache": true,
    })
    .to_string()
}
