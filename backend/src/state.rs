use std::sync::Arc;

use crate::{
    config::Config,
    middleware::MethodTable,
    repositories::{SessionStore, UserStore},
    services::{ClientRegistry, IdentityCache, SessionService},
    utils::{jwt::TokenIssuer, keys::KeyMaterial},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub issuer: Arc<TokenIssuer>,
    pub sessions: SessionService,
    pub users: Arc<dyn UserStore>,
    pub clients: Arc<ClientRegistry>,
    pub methods: Arc<MethodTable>,
    pub cache: IdentityCache,
}

impl AppState {
    /// Wires every service over one store that holds both sessions and users.
    pub fn new<S>(
        config: Config,
        keys: Arc<KeyMaterial>,
        store: Arc<S>,
        clients: ClientRegistry,
        cache: IdentityCache,
    ) -> Self
    where
        S: SessionStore + UserStore + 'static,
    {
        let issuer = Arc::new(TokenIssuer::from_config(keys, &config));
        let session_store: Arc<dyn SessionStore> = store.clone();
        let sessions = SessionService::from_config(session_store, issuer.clone(), &config);

        Self {
            config: Arc::new(config),
            issuer,
            sessions,
            users: store,
            clients: Arc::new(clients),
            methods: Arc::new(MethodTable::standard()),
            cache,
        }
    }

    pub fn with_methods(mut self, methods: MethodTable) -> Self {
        self.methods = Arc::new(methods);
        self
    }
}
