// communication/mod.rs
pub mod amqp_link;
pub mod coordination_link;
pub mod messages;
