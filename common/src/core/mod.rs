pub mod event_router;
pub mod in_memory_message_broker;
pub mod message_broker;
pub mod message_worker;
pub mod rabbitmq_message_repository;
