//! Registered tenant applications, loaded once at boot.

use anyhow::{anyhow, Context};
use axum::http::{HeaderMap, HeaderName};
use std::{collections::HashMap, fs, path::Path};

use crate::{error::AuthError, models::Client};

#[derive(Debug, Clone)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
    header: HeaderName,
}

impl ClientRegistry {
    /// Reads a JSON array of `{"id", "name"}` objects.
    pub fn load(path: &Path, header: &str) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read client registry {}", path.display()))?;
        let clients: Vec<Client> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid client registry {}", path.display()))?;
        Self::from_clients(clients, header)
    }

    pub fn from_clients(clients: Vec<Client>, header: &str) -> anyhow::Result<Self> {
        if clients.is_empty() {
            return Err(anyhow!("Client registry is empty"));
        }
        let header = HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())
            .with_context(|| format!("Invalid client header name: {}", header))?;

        let mut by_id = HashMap::with_capacity(clients.len());
        for client in clients {
            if client.id.trim().is_empty() {
                return Err(anyhow!("Client registry contains an empty id"));
            }
            if by_id.contains_key(&client.id) {
                return Err(anyhow!("Duplicate client id in registry: {}", client.id));
            }
            by_id.insert(client.id.clone(), client);
        }

        Ok(Self {
            clients: by_id,
            header,
        })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Resolves the calling client from request metadata.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Client, AuthError> {
        let value = headers
            .get(&self.header)
            .ok_or(AuthError::ClientHeaderMissing)?;
        let id = value.to_str().map_err(|_| AuthError::UnknownClient)?.trim();
        if id.is_empty() {
            return Err(AuthError::ClientHeaderMissing);
        }
        self.get(id).cloned().ok_or(AuthError::UnknownClient)
    }
}
