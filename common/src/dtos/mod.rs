pub mod document_events;
pub mod event_payload;
pub mod graph_events;
pub mod query_events;
pub mod status_events;
pub mod workspace_events;
