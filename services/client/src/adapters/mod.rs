pub mod answer_llm;
pub mod auth;
pub mod db;
pub mod local_store;

pub use answer_llm::OpenAiAnswerAdapter;
pub use auth::HostedAuthAdapter;
pub use db::DbAdapter;
pub use local_store::FileLocalStore;
