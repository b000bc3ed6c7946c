use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A registered tenant application allowed to call the service.
pub struct Client {
    pub id: String,
    pub name: String,
}
