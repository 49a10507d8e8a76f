pub mod conversation_request;
pub mod conversation_route;
