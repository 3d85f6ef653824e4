pub(crate) mod access_codes;
pub(crate) mod assignment_lifecycle;
pub(crate) mod blueprint;
pub(crate) mod grading;
pub(crate) mod session;
pub(crate) mod shuffle;
