//! Namespace Migration Handler - identity 変更（namespace / job id）を
//! 「旧 identity の teardown → 新 identity への submit」として実行
//!
//! ```text
//! Detect diff ─▶ Teardown(old) ─▶ retarget(state) ─▶ Submit(new)
//!                    │ error                             │ error
//!                    ▼                                   ▼
//!              state 変更なし                    PartialMigration
//!                                            (state は新 identity を指し、
//!                                             submit 待ちのまま)
//! ```
//!
//! 新 identity への登録が済んだ後の失敗（evaluation / deployment）は
//! PartialMigration ではなく、元のエラーをそのまま返す。
//!
//! PartialMigration 後の再試行は teardown をやり直さない:
//! state が submit 待ちなら旧 identity はもう存在しないため。

use tracing::{info, instrument, warn};

use super::submission::{Submission, SubmissionManager, SubmitOptions};
use super::teardown::{TeardownManager, TeardownOutcome};
use crate::domain::{JobIdentity, JobSpecification, ReconcileError, ReconciliationState};

pub struct MigrationHandler<'a> {
    submission: &'a SubmissionManager,
    teardown: &'a TeardownManager,
}

impl<'a> MigrationHandler<'a> {
    pub fn new(submission: &'a SubmissionManager, teardown: &'a TeardownManager) -> Self {
        Self {
            submission,
            teardown,
        }
    }

    #[instrument(skip_all, fields(from = %state.identity, to = %to))]
    pub async fn migrate(
        &self,
        state: &mut ReconciliationState,
        to: JobIdentity,
        spec: &JobSpecification,
        options: SubmitOptions,
    ) -> Result<Submission, ReconcileError> {
        let from = state.identity.clone();

        if state.is_pending_submission() {
            info!("previous identity was already torn down, submitting only");
        } else {
            let outcome = self
                .teardown
                .teardown(&from, state.teardown_policy(), options.deadline)
                .await?;
            if outcome == TeardownOutcome::Skipped {
                warn!("deregister_on_destroy is off, the job keeps running under the old identity");
            }
        }

        state.retarget(to.clone());

        self.submission
            .submit(spec, state, options)
            .await
            .map_err(|source| {
                if state.is_pending_submission() {
                    ReconcileError::PartialMigration {
                        from,
                        to,
                        source: Box::new(source),
                    }
                } else {
                    source
                }
            })
    }
}
