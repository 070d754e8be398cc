// Reminders: adopted plants persisted with one reminder time each, and the
// scheduler that turns those times into notifications.

pub mod clock;
pub mod handlers;
pub mod scheduler;
pub mod store;
