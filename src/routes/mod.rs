pub mod medications;
pub mod moderation;
pub mod streak;
pub mod symptoms;
pub mod trends;
