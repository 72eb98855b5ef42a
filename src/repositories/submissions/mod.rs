mod commands;
mod queries;
mod types;

pub(crate) use commands::{
    claim_next_pending, insert, lock_attempts, record_failure, record_grade, release_stale, revise,
};
pub(crate) use queries::{
    count_attempts, count_by_exam, count_for_exam, count_pending_for_exam, find_by_id,
    list_by_exam, list_by_student,
};
pub(crate) use types::{CreateSubmission, ExamSubmissionRow, GradeUpdate, StudentSubmissionRow};
