pub mod envelope;
pub mod template;
