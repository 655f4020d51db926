//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **DefaultJobspecParser**: format に応じて JSON / structured-text を振り分け
//!   - `JsonJobspecParser`: `{"Job": ...}` envelope / bare job
//!   - `HclJobspecParser`: structured-text（変数・filesystem 関数の制御つき）
//! - **HttpSchedulerClient**: 本番用、スケジューラ HTTP API
//! - **InMemoryScheduler**: テスト・デモ用のシミュレーション

pub mod hcl_parser;
pub mod http_scheduler;
pub mod inmem_scheduler;
pub mod json_parser;
pub mod parser;

// 主要な型を再エクスポート
pub use self::hcl_parser::HclJobspecParser;
pub use self::http_scheduler::HttpSchedulerClient;
pub use self::inmem_scheduler::{CallCounts, InMemoryScheduler, SimBehavior, SimPolicy};
pub use self::json_parser::JsonJobspecParser;
pub use self::parser::DefaultJobspecParser;
