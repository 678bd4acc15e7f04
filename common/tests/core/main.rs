mod event_router;
mod message_worker;
