mod create;
mod lifecycle;
mod list;
mod manage;

pub(super) use create::{add_questions, create_exam};
pub(super) use lifecycle::{close_exam, finalize_exam, publish_exam};
pub(super) use list::list_exams;
pub(super) use manage::{delete_exam, get_exam, update_exam};
