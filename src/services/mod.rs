pub mod badge;
pub mod bookings;
pub mod init;
pub mod notifications;
pub mod persistence;
pub mod view_tracker;
pub mod write_queue;
