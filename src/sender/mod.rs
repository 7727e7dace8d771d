pub mod reliable_sender;
pub mod send_queue;
