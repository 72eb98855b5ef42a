pub(crate) mod auth;
pub(crate) mod code;
pub(crate) mod errors;
pub(crate) mod exams;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod participants;
pub(crate) mod router;
pub(crate) mod submissions;
pub(crate) mod validation;
