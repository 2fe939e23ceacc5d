use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::db::{DB, DBError, SharedDB, load_db};
use crate::handlers::api;
use crate::models::conversation::{self, ChatTurn};
use crate::models::event::{self, CalendarEvent};
use crate::models::user::{self, User};
use crate::service::account_service::AccountService;
use crate::service::chat_service::ChatService;
use crate::service::conversation_service::ConversationService;
use crate::service::event_service::EventService;
use crate::service::provider::ProviderAdapter;
use crate::service::rate_limit::RateGovernor;

pub struct Tables {
    pub users: SharedDB<User>,
    pub events: SharedDB<CalendarEvent>,
    pub conversations: SharedDB<ChatTurn>,
}

impl Tables {
    pub fn load(location: &str) -> Result<Self, DBError> {
        let users: DB<User> = load_db(location, user::TABLE_NAME)?;
        let events: DB<CalendarEvent> = load_db(location, event::TABLE_NAME)?;
        let conversations: DB<ChatTurn> = load_db(location, conversation::TABLE_NAME)?;
        info!(
            location,
            users = users.len(),
            events = events.len(),
            turns = conversations.len(),
            "tables loaded"
        );
        Ok(Self {
            users: users.shared(),
            events: events.shared(),
            conversations: conversations.shared(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            users: DB::in_memory(user::TABLE_NAME).shared(),
            events: DB::in_memory(event::TABLE_NAME).shared(),
            conversations: DB::in_memory(conversation::TABLE_NAME).shared(),
        }
    }
}

/// Per-route request ceilings, keyed by user.
pub struct RateLimits {
    pub events: RateGovernor,
    pub timezone: RateGovernor,
    pub chat: RateGovernor,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            events: RateGovernor::per_minute(20),
            timezone: RateGovernor::per_minute(10),
            chat: RateGovernor::per_minute(20),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub events: EventService,
    pub chat: Arc<ChatService>,
    pub limits: Arc<RateLimits>,
}

impl AppState {
    pub fn new(tables: Tables, provider: ProviderAdapter, limits: RateLimits) -> Self {
        let events = EventService::new(tables.events);
        let chat = ChatService::new(
            ConversationService::new(tables.conversations),
            events.clone(),
            Arc::new(provider),
        );
        Self {
            accounts: Arc::new(AccountService::new(tables.users)),
            events,
            chat: Arc::new(chat),
            limits: Arc::new(limits),
        }
    }

    pub fn load(settings: &Settings) -> Result<Self, DBError> {
        let tables = Tables::load(&settings.db_location)?;
        let provider = ProviderAdapter::from_settings(&settings.provider);
        Ok(Self::new(tables, provider, RateLimits::default()))
    }
}

pub async fn run_api(state: AppState, addr: SocketAddr) {
    info!(%addr, provider = state.chat.provider_name(), "starting API server");
    warp::serve(api::routes(state)).run(addr).await;
}
