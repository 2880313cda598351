pub mod caption_source;
pub mod store;
pub mod summarizer;
