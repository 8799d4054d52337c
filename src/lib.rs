pub mod budget;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod interleave;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod toc;

pub use config::AppConfig;
pub use error::QuizError;
pub use pipeline::QuizService;
