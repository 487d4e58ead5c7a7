pub mod bulk;
pub mod converter;
pub mod google;
pub mod matcher;
pub mod reconciliation;
pub mod writer;
