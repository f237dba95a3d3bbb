//! Recognizer adapters implementing the `Recognizer` port.

mod keyword;

pub use keyword::KeywordRecognizer;
