pub mod routing_keys;
