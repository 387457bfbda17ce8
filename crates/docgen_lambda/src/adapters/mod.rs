pub mod document_engine;
pub mod docx;
pub mod object_store;
pub mod s3_store;
