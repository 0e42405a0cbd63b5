// Fulfillment lifecycle
pub mod fulfillment;

// Visibility-filtered reads
pub mod directory;
