pub mod auth;
pub mod client;
pub mod context;
pub mod methods;
pub mod request_id;

pub use auth::{authenticate_bearer, authorization_gate, GateState};
pub use client::client_gate;
pub use context::{Authenticated, CallContext, CallerClient};
pub use methods::MethodTable;
pub use request_id::{request_id, RequestId};
