//! JobspecParser port - jobspec の正規化

use crate::domain::{JobSpecification, ParseError, ParsedJob};

/// JobspecParser は jobspec を解析して `ParsedJob` を返す
///
/// 純粋関数であること（リモート呼び出しなし）。
/// 失敗はすべて local validation error として扱われ、register は呼ばれない。
pub trait JobspecParser: Send + Sync {
    fn parse(&self, spec: &JobSpecification) -> Result<ParsedJob, ParseError>;
}
