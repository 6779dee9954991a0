pub mod layout;
pub mod models;
pub mod recurrence;
pub mod timegrid;
