//! keel-core
//!
//! Job lifecycle reconciler for a cluster workload scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（identity, jobspec, remote job, deployment, state, drift, errors）
//! - **ports**: 抽象化レイヤー（SchedulerClient, JobspecParser, Clock）
//! - **app**: アプリケーションロジック（submission, deployment, drift, teardown, migration, resource）
//! - **impls**: 実装（HTTP / in-memory scheduler, jobspec parsers）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
