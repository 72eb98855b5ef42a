pub(crate) mod ai_grading;
pub(crate) mod attempts;
pub(crate) mod code_runner;
pub(crate) mod exam_access;
pub(crate) mod exam_lifecycle;
pub(crate) mod grading;
pub(crate) mod join_codes;
pub(crate) mod participation;
