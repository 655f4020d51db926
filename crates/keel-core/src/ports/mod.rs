//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! reconciler のロジックはこの trait にだけ依存し、
//! スケジューラ・jobspec パーサ・時計の実装を知りません。

pub mod clock;
pub mod parser;
pub mod scheduler;

pub use self::clock::{Clock, SimulatedClock, SystemClock};
pub use self::parser::JobspecParser;
pub use self::scheduler::{RegisterRequest, RegisterResponse, SchedulerClient};
