// Fulfillment core
pub mod fulfillment_assignment;
pub mod fulfillment_audit_log;
pub mod fulfillment_document;
pub mod fulfillment_line_item;
pub mod fulfillment_order;

// CRM rows carrying soft-visibility and integration flags
pub mod contact;
pub mod note;
pub mod quote;
pub mod user;
