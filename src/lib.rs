pub mod ai;
pub mod app;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod diagram;
pub mod editor;
pub mod export;
pub mod model;
pub mod storage;
pub mod sync;
pub mod workspace;

pub use app::App;
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use model::{Node, NodeKind, Note, NoteDraft, Snapshot};
pub use workspace::Workspace;
