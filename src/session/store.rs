use crate::session::{ClientSession, UserSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Shared<T> = Arc<Mutex<T>>;

/// In-memory registry of user and client scopes. Each entry sits behind its
/// own lock so a client only ever has one request in flight.
pub struct SessionStore<U, C> {
    users: Mutex<HashMap<String, Shared<UserSession<U>>>>,
    clients: Mutex<HashMap<String, Shared<ClientSession<C>>>>,
}

impl<U: Default, C: Default> SessionStore<U, C> {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn user(&self, user_id: &str) -> Shared<UserSession<U>> {
        let mut users = self.users.lock().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserSession::default())))
            .clone()
    }

    pub async fn client(&self, client_id: &str) -> Shared<ClientSession<C>> {
        let mut clients = self.clients.lock().await;
        clients
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ClientSession::default())))
            .clone()
    }

    pub async fn remove_client(&self, client_id: &str) -> bool {
        self.clients.lock().await.remove(client_id).is_some()
    }

    #[cfg(test)]
    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}

impl<U: Default, C: Default> Default for SessionStore<U, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_client_id_returns_same_session() {
        let store: SessionStore<u32, u32> = SessionStore::new();
        {
            let client = store.client("tab-1").await;
            let mut session = client.lock().await;
            session.state = 7;
            session.initialized = true;
        }

        let client = store.client("tab-1").await;
        let session = client.lock().await;
        assert_eq!(session.state, 7);
        assert!(session.initialized);
        assert_eq!(store.client_count().await, 1);
    }

    #[tokio::test]
    async fn removed_client_starts_fresh() {
        let store: SessionStore<u32, u32> = SessionStore::new();
        store.client("tab-1").await.lock().await.initialized = true;

        assert!(store.remove_client("tab-1").await);
        assert!(!store.remove_client("tab-1").await);
        assert!(!store.client("tab-1").await.lock().await.initialized);
    }

    #[tokio::test]
    async fn users_are_shared_across_clients() {
        let store: SessionStore<Vec<&'static str>, ()> = SessionStore::new();
        store.user("ada").await.lock().await.state.push("from-tab-1");
        store.user("ada").await.lock().await.state.push("from-tab-2");

        let user = store.user("ada").await;
        assert_eq!(user.lock().await.state, vec!["from-tab-1", "from-tab-2"]);
    }
}
